//! Shared fixtures: an in-memory admin API and manager construction

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use proxysync::gateway::server_path;
use proxysync::{Error, GatewayApi, GatewayConfig, GatewayResponse, ProxyManager, Result};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::{json, Value};
use std::path::Path;

#[derive(Default)]
struct State {
    config: Value,
    upstreams: Value,
    requests: Vec<(Method, String)>,
    offline: bool,
    fail_writes: bool,
}

/// Admin API over a JSON tree, following the gateway's path semantics:
/// PUT creates (409 when present), PATCH replaces (404 when absent),
/// POST creates or replaces, GET on a missing path yields `null`.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Value) -> Self {
        let gateway = Self::new();
        gateway.state.lock().config = config;
        gateway
    }

    /// Every request fails as if the connection was refused
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Every non-GET request fails with a 500
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    pub fn set_upstreams(&self, upstreams: Value) {
        self.state.lock().upstreams = upstreams;
    }

    pub fn config(&self) -> Value {
        self.state.lock().config.clone()
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.state.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }

    /// Requests other than GET, as `"METHOD path"`
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(method, _)| *method != Method::GET)
            .map(|(method, path)| format!("{} {}", method, path))
            .collect()
    }

    pub fn server(&self, name: &str) -> Option<Value> {
        self.state
            .lock()
            .config
            .pointer(&format!("/apps/http/servers/{}", name))
            .cloned()
    }

    pub fn server_names(&self) -> Vec<String> {
        self.state
            .lock()
            .config
            .pointer("/apps/http/servers")
            .and_then(Value::as_object)
            .map(|servers| servers.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn insert_server(&self, name: &str, server: Value) {
        let mut state = self.state.lock();
        let servers = ensure_path(&mut state.config, &["apps", "http", "servers"]);
        if let Some(servers) = servers.and_then(Value::as_object_mut) {
            servers.insert(name.to_string(), server);
        }
    }

    pub fn remove_server(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(servers) = state
            .config
            .pointer_mut("/apps/http/servers")
            .and_then(Value::as_object_mut)
        {
            servers.remove(name);
        }
    }

    fn handle(state: &mut State, method: &Method, path: &str, body: Option<&Value>) -> Result<Value> {
        if let Some(rest) = path.strip_prefix("/config") {
            let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
            return config_request(&mut state.config, method, &segments, body);
        }
        if let Some(id) = path.strip_prefix("/id/") {
            return id_request(&mut state.config, method, id, body);
        }
        match (method.as_str(), path) {
            ("POST", "/load") => {
                state.config = body.cloned().unwrap_or(Value::Null);
                Ok(Value::Null)
            }
            ("GET", "/reverse_proxy/upstreams") => Ok(state.upstreams.clone()),
            _ => Err(status(404, format!("no handler for {} {}", method, path))),
        }
    }
}

#[async_trait]
impl GatewayApi for MemoryGateway {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<GatewayResponse> {
        let mut state = self.state.lock();
        state.requests.push((method.clone(), path.to_string()));
        if state.offline {
            return Err(Error::Transport("connection refused".into()));
        }
        if state.fail_writes && method != Method::GET {
            return Err(status(500, "write rejected".into()));
        }

        let value = Self::handle(&mut state, &method, path, body)?;
        let body = serde_json::to_vec(&value).map_err(Error::from)?;
        Ok(GatewayResponse {
            body: Bytes::from(body),
            headers: HeaderMap::new(),
        })
    }
}

fn status(status: u16, body: String) -> Error {
    Error::Gateway { status, body }
}

fn pointer(segments: &[&str]) -> String {
    segments.iter().map(|s| format!("/{}", s)).collect()
}

/// Walk to `segments`, creating empty objects along the way
fn ensure_path<'a>(root: &'a mut Value, segments: &[&str]) -> Option<&'a mut Value> {
    let mut current = root;
    for segment in segments {
        if current.is_null() {
            *current = json!({});
        }
        current = match current {
            Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        *current = json!({});
    }
    Some(current)
}

fn config_request(
    config: &mut Value,
    method: &Method,
    segments: &[&str],
    body: Option<&Value>,
) -> Result<Value> {
    let body = body.cloned().unwrap_or(Value::Null);
    let Some((last, parent_segments)) = segments.split_last() else {
        return match method.as_str() {
            "GET" => Ok(config.clone()),
            "POST" | "PATCH" | "PUT" => {
                *config = body;
                Ok(Value::Null)
            }
            "DELETE" => {
                *config = Value::Null;
                Ok(Value::Null)
            }
            _ => Err(status(405, "method not allowed".into())),
        };
    };

    match method.as_str() {
        "GET" => Ok(config
            .pointer(&pointer(segments))
            .cloned()
            .unwrap_or(Value::Null)),
        "PATCH" => match config.pointer_mut(&pointer(segments)) {
            Some(slot) => {
                *slot = body;
                Ok(Value::Null)
            }
            None => Err(status(404, format!("path {} does not exist", pointer(segments)))),
        },
        "DELETE" => {
            let removed = match config.pointer_mut(&pointer(parent_segments)) {
                Some(Value::Object(map)) => map.remove(*last).is_some(),
                Some(Value::Array(items)) => match last.parse::<usize>() {
                    Ok(i) if i < items.len() => {
                        items.remove(i);
                        true
                    }
                    _ => false,
                },
                _ => false,
            };
            if removed {
                Ok(Value::Null)
            } else {
                Err(status(404, format!("path {} does not exist", pointer(segments))))
            }
        }
        "PUT" | "POST" => {
            if let Some(Value::Array(items)) = config.pointer_mut(&pointer(segments)) {
                if *method == Method::POST {
                    items.push(body);
                    return Ok(Value::Null);
                }
            }
            let parent = ensure_path(config, parent_segments)
                .ok_or_else(|| status(400, "invalid traversal path".into()))?;
            match parent {
                Value::Object(map) => {
                    if *method == Method::PUT && map.contains_key(*last) {
                        return Err(status(409, format!("key already exists: {}", last)));
                    }
                    map.insert(last.to_string(), body);
                    Ok(Value::Null)
                }
                Value::Array(items) => {
                    let index = last
                        .parse::<usize>()
                        .map_err(|_| status(400, "invalid array index".into()))?;
                    if index > items.len() {
                        return Err(status(400, "array index out of bounds".into()));
                    }
                    items.insert(index, body);
                    Ok(Value::Null)
                }
                _ => Err(status(400, "invalid traversal path".into())),
            }
        }
        _ => Err(status(405, "method not allowed".into())),
    }
}

fn has_id(value: &Value, id: &str) -> bool {
    value.get("@id").and_then(Value::as_str) == Some(id)
}

fn find_by_id<'a>(value: &'a mut Value, id: &str) -> Option<&'a mut Value> {
    if has_id(value, id) {
        return Some(value);
    }
    match value {
        Value::Object(map) => map.values_mut().find_map(|v| find_by_id(v, id)),
        Value::Array(items) => items.iter_mut().find_map(|v| find_by_id(v, id)),
        _ => None,
    }
}

fn remove_by_id(value: &mut Value, id: &str) -> bool {
    match value {
        Value::Object(map) => {
            let key = map
                .iter()
                .find(|(_, v)| has_id(v, id))
                .map(|(k, _)| k.clone());
            if let Some(key) = key {
                map.remove(&key);
                return true;
            }
            map.values_mut().any(|v| remove_by_id(v, id))
        }
        Value::Array(items) => {
            if let Some(pos) = items.iter().position(|v| has_id(v, id)) {
                items.remove(pos);
                return true;
            }
            items.iter_mut().any(|v| remove_by_id(v, id))
        }
        _ => false,
    }
}

fn id_request(config: &mut Value, method: &Method, id: &str, body: Option<&Value>) -> Result<Value> {
    let missing = || status(404, format!("unknown object ID '{}'", id));
    match method.as_str() {
        "GET" => find_by_id(config, id).map(|v| v.clone()).ok_or_else(missing),
        "PATCH" => {
            let slot = find_by_id(config, id).ok_or_else(missing)?;
            *slot = body.cloned().unwrap_or(Value::Null);
            Ok(Value::Null)
        }
        "DELETE" => {
            if remove_by_id(config, id) {
                Ok(Value::Null)
            } else {
                Err(missing())
            }
        }
        _ => Err(status(405, "method not allowed".into())),
    }
}

/// Config whose server map lives in `dir`
pub fn config_in(dir: &Path) -> GatewayConfig {
    GatewayConfig {
        server_map_path: dir.join("gateway_servers.json"),
        ..Default::default()
    }
}

pub fn manager(dir: &Path, gateway: MemoryGateway) -> ProxyManager<MemoryGateway> {
    ProxyManager::open(gateway, &config_in(dir))
}

/// A route the way a hand-written gateway config would carry it: bare
/// `reverse_proxy` handler, no `@id`
pub fn foreign_server(hostname: &str, port: u16, dial: &str) -> Value {
    json!({
        "listen": [format!(":{}", port)],
        "routes": [{
            "match": [{"host": [hostname]}],
            "handle": [{
                "handler": "reverse_proxy",
                "upstreams": [{"dial": dial}]
            }],
            "terminal": true
        }]
    })
}

/// Config path of one server, relative to the admin base URL
pub fn server_config_path(name: &str) -> String {
    format!("/config{}", server_path(name))
}
