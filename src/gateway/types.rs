//! Typed gateway config objects
//!
//! Handlers are polymorphic on the wire (an object with a `handler` kind
//! string). They are modelled as a sum type and only converted to and from
//! untyped JSON at the serde boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const REVERSE_PROXY: &str = "reverse_proxy";
pub const SUBROUTE: &str = "subroute";

fn is_false(value: &bool) -> bool {
    !*value
}

/// A listener plus its ordered routes, as written by this crate
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GatewayServer {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listen: Vec<String>,
    #[serde(default)]
    pub routes: Vec<GatewayRoute>,
}

/// A server as read back from the gateway
///
/// Routes stay untyped so one unparseable route does not poison the listing.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RawServer {
    pub listen: Vec<String>,
    pub routes: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GatewayRoute {
    #[serde(rename = "@id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "match", default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<MatcherSet>,
    #[serde(default)]
    pub handle: Vec<Handler>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub terminal: bool,
}

/// All matchers in a set must match
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSet {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Handler {
    ReverseProxy(ReverseProxyHandler),
    Subroute(SubrouteHandler),
    /// A handler kind this crate does not manage, kept verbatim
    Other(Value),
}

impl Handler {
    pub fn kind(&self) -> &str {
        match self {
            Handler::ReverseProxy(_) => REVERSE_PROXY,
            Handler::Subroute(_) => SUBROUTE,
            Handler::Other(value) => value
                .get("handler")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        }
    }
}

impl TryFrom<Value> for Handler {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let kind = value
            .get("handler")
            .and_then(Value::as_str)
            .ok_or_else(|| "handler object has no \"handler\" kind".to_string())?;

        match kind {
            REVERSE_PROXY => serde_json::from_value(value)
                .map(Handler::ReverseProxy)
                .map_err(|e| format!("reverse_proxy handler: {}", e)),
            SUBROUTE => serde_json::from_value(value)
                .map(Handler::Subroute)
                .map_err(|e| format!("subroute handler: {}", e)),
            _ => Ok(Handler::Other(value)),
        }
    }
}

impl From<Handler> for Value {
    fn from(handler: Handler) -> Self {
        let (kind, mut value) = match handler {
            Handler::ReverseProxy(inner) => {
                (REVERSE_PROXY, serde_json::to_value(inner).unwrap_or_default())
            }
            Handler::Subroute(inner) => (SUBROUTE, serde_json::to_value(inner).unwrap_or_default()),
            Handler::Other(value) => return value,
        };
        if let Value::Object(map) = &mut value {
            map.insert("handler".to_string(), Value::String(kind.to_string()));
        }
        value
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverseProxyHandler {
    #[serde(rename = "@id", skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub upstreams: Vec<Upstream>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trusted_proxies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubrouteHandler {
    pub routes: Vec<GatewayRoute>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Upstream {
    pub dial: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<HeaderOps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<HeaderOps>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderOps {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<String>,
}

/// Upstream transport; only the `http` protocol is produced here
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Transport {
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TransportTls>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportTls {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca: Option<CaSource>,
    /// Older configs list CA files directly on the TLS block
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub root_ca_pem_files: Vec<String>,
}

/// Where the transport loads trusted CA certificates from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaSource {
    pub provider: String,
    pub pem_files: Vec<String>,
}

/// Health counters reported by `/reverse_proxy/upstreams`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamStatus {
    pub address: String,
    pub num_requests: i64,
    pub fails: i64,
}
