//! Proxy records: the declarative description of one hostname:port -> target mapping

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One desired reverse-proxy mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProxyRecord {
    pub id: String,
    pub hostname: String,
    pub port: u16,
    /// `scheme://host:port` or a bare `host:port` dial string
    pub target: String,
    #[serde(rename = "tls")]
    pub tls_enabled: bool,
    /// CA bundle used to verify the upstream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert_file: Option<String>,
    pub trusted_proxies: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_headers: BTreeMap<String, String>,
    pub enabled: bool,
    pub autostart: bool,
}

/// The on-disk shape of a list of proxy records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyList {
    #[serde(default)]
    pub proxies: Vec<ProxyRecord>,
}

/// Trim whitespace and a trailing dot
pub fn normalize_hostname(hostname: &str) -> String {
    let hostname = hostname.trim();
    hostname.strip_suffix('.').unwrap_or(hostname).to_string()
}

/// Key used by the host:port index of the server map
pub fn host_port_key(hostname: &str, port: u16) -> String {
    format!("{}:{}", normalize_hostname(hostname), port)
}

/// Generate a new opaque record id
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl ProxyRecord {
    pub fn new(hostname: &str, port: u16, target: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            port,
            target: target.to_string(),
            enabled: true,
            ..Default::default()
        }
    }

    /// `hostname:port`, or `None` when either half is missing
    pub fn host_port_key(&self) -> Option<String> {
        if self.hostname.is_empty() || self.port == 0 {
            return None;
        }
        Some(host_port_key(&self.hostname, self.port))
    }

    /// Normalize fields in place before the record is stored or applied
    pub fn normalize(&mut self) {
        self.hostname = normalize_hostname(&self.hostname);
        self.target = self.target.trim().to_string();
        if let Some(file) = self.tls_cert_file.take() {
            let file = file.trim();
            if !file.is_empty() {
                self.tls_cert_file = Some(file.to_string());
                self.tls_enabled = true;
            }
        }
    }

    /// Check the fields a gateway route cannot be built without
    pub fn validate(&self) -> Result<()> {
        if self.hostname.is_empty() {
            return Err(Error::Validation("hostname is required".into()));
        }
        if self.hostname.contains(char::is_whitespace) || self.hostname.contains('/') {
            return Err(Error::Validation(format!(
                "malformed hostname: {:?}",
                self.hostname
            )));
        }
        if self.port == 0 {
            return Err(Error::Validation("port must be between 1 and 65535".into()));
        }
        if self.target.is_empty() {
            return Err(Error::Validation("target is required".into()));
        }
        Ok(())
    }
}
