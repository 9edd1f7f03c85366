//! Gateway admin API access
//!
//! `GatewayApi` is the single seam between the manager and the gateway: one
//! required `request` method plus the path-level helpers built on top of it.

pub mod client;
pub mod types;

pub use client::AdminClient;
pub use types::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;

/// Config path of the HTTP app's server collection
pub const SERVERS_PATH: &str = "/apps/http/servers";

/// Config path of one named server
pub fn server_path(name: &str) -> String {
    format!("{}/{}", SERVERS_PATH, name)
}

/// Raw body and headers of a successful admin API call
#[derive(Debug, Clone, Default)]
pub struct GatewayResponse {
    pub body: Bytes,
    pub headers: HeaderMap,
}

impl GatewayResponse {
    /// Decode the body as JSON; an empty body is `null`
    pub fn json(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Issue one admin API request; `path` is relative to the base URL
    ///
    /// Fails with `Error::Gateway` on status >= 400 and `Error::Transport`
    /// when the request never completed.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<GatewayResponse>;

    async fn get_config(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, &config_path(path), None)
            .await?
            .json()
    }

    /// Append to an array or create/replace an object
    async fn post_config(&self, path: &str, body: &Value) -> Result<()> {
        self.request(Method::POST, &config_path(path), Some(body))
            .await
            .map(drop)
    }

    /// Insert into an array or strictly create an object
    async fn put_config(&self, path: &str, body: &Value) -> Result<()> {
        self.request(Method::PUT, &config_path(path), Some(body))
            .await
            .map(drop)
    }

    /// Strictly replace an existing value
    async fn patch_config(&self, path: &str, body: &Value) -> Result<()> {
        self.request(Method::PATCH, &config_path(path), Some(body))
            .await
            .map(drop)
    }

    async fn delete_config(&self, path: &str) -> Result<()> {
        self.request(Method::DELETE, &config_path(path), None)
            .await
            .map(drop)
    }

    async fn get_by_id(&self, id: &str) -> Result<Value> {
        self.request(Method::GET, &format!("/id/{}", id), None)
            .await?
            .json()
    }

    async fn patch_by_id(&self, id: &str, body: &Value) -> Result<()> {
        self.request(Method::PATCH, &format!("/id/{}", id), Some(body))
            .await
            .map(drop)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.request(Method::DELETE, &format!("/id/{}", id), None)
            .await
            .map(drop)
    }

    /// Replace the entire gateway config
    async fn load(&self, config: &Value) -> Result<()> {
        self.request(Method::POST, "/load", Some(config))
            .await
            .map(drop)
    }

    async fn upstreams(&self) -> Result<Vec<UpstreamStatus>> {
        let value = self
            .request(Method::GET, "/reverse_proxy/upstreams", None)
            .await?
            .json()?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value)
            .map_err(|e| Error::Conversion(format!("upstream status list: {}", e)))
    }

    /// Every HTTP server the gateway currently holds, keyed by server name
    async fn list_servers(&self) -> Result<BTreeMap<String, RawServer>> {
        let value = self.get_config(SERVERS_PATH).await?;
        if value.is_null() {
            return Ok(BTreeMap::new());
        }
        let servers: BTreeMap<String, Option<RawServer>> = serde_json::from_value(value)
            .map_err(|e| Error::Conversion(format!("server listing: {}", e)))?;
        Ok(servers
            .into_iter()
            .filter_map(|(name, server)| server.map(|s| (name, s)))
            .collect())
    }

    /// Existence probe for one server; any failure counts as absent
    async fn server_exists(&self, name: &str) -> bool {
        match self.get_config(&server_path(name)).await {
            Ok(value) => !value.is_null(),
            Err(e) => {
                tracing::debug!("Existence probe for server {} failed: {}", name, e);
                false
            }
        }
    }
}

fn config_path(path: &str) -> String {
    if path.is_empty() {
        "/config/".to_string()
    } else if path.starts_with('/') {
        format!("/config{}", path)
    } else {
        format!("/config/{}", path)
    }
}
