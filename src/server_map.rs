//! Server-name map
//!
//! Remembers which gateway server holds the route for each proxy, indexed by
//! proxy id and by `hostname:port`, plus the next `srvN` suffix to try. The
//! map is persisted after every mutation.

use crate::error::Result;
use crate::proxy::ProxyRecord;
use crate::store::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const SERVER_NAME_PREFIX: &str = "srv";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMap {
    #[serde(default)]
    pub by_proxy_id: BTreeMap<String, String>,
    #[serde(default)]
    pub by_host_port: BTreeMap<String, String>,
    #[serde(default)]
    pub next_index: u64,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl ServerMap {
    /// An empty map that is never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// An empty map persisted at `path`, replacing whatever is there on first save
    pub fn empty_at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Load the map at `path`, starting empty if the file does not exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut map = match fs::read(&path) {
            Ok(data) => serde_json::from_slice::<ServerMap>(&data)?,
            Err(e) if e.kind() == ErrorKind::NotFound => ServerMap::default(),
            Err(e) => return Err(e.into()),
        };
        map.path = Some(path);
        Ok(map)
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let data = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &data)?;
        Ok(())
    }

    /// Pick the first `srvN` (N >= next_index) not used by the gateway or by
    /// either index, advance `next_index` past it and persist
    pub fn allocate<I, S>(&mut self, gateway_names: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut taken: HashSet<String> = gateway_names.into_iter().map(Into::into).collect();
        taken.extend(self.by_proxy_id.values().cloned());
        taken.extend(self.by_host_port.values().cloned());

        let mut index = self.next_index;
        let name = loop {
            let candidate = format!("{}{}", SERVER_NAME_PREFIX, index);
            if !taken.contains(&candidate) {
                break candidate;
            }
            index += 1;
        };

        self.next_index = index + 1;
        self.save()?;
        debug!("Allocated server name {}", name);
        Ok(name)
    }

    /// Index-only lookup: by proxy id first, then by host:port
    pub fn lookup(&self, proxy_id: &str, host_port: Option<&str>) -> Option<String> {
        if !proxy_id.is_empty() {
            if let Some(name) = self.by_proxy_id.get(proxy_id) {
                return Some(name.clone());
            }
        }
        host_port.and_then(|key| self.by_host_port.get(key).cloned())
    }

    /// Point both indices for `proxy` at `server_name` and persist
    ///
    /// Older host:port keys for `server_name` are dropped so a proxy that
    /// moved does not leave its previous address pointing at its server.
    pub fn record(&mut self, proxy: &ProxyRecord, server_name: &str) -> Result<()> {
        if server_name.is_empty() {
            return Ok(());
        }
        if !proxy.id.is_empty() {
            self.by_proxy_id
                .insert(proxy.id.clone(), server_name.to_string());
        }
        if let Some(key) = proxy.host_port_key() {
            self.by_host_port.retain(|_, name| name != server_name);
            self.by_host_port.insert(key, server_name.to_string());
        }
        self.save()
    }

    /// Forget `proxy_id` and every entry pointing at `server_name`, then persist
    pub fn remove(&mut self, proxy_id: &str, server_name: &str) -> Result<()> {
        if !proxy_id.is_empty() {
            self.by_proxy_id.remove(proxy_id);
        }
        if !server_name.is_empty() {
            self.by_proxy_id.retain(|_, name| name != server_name);
            self.by_host_port.retain(|_, name| name != server_name);
        }
        self.save()
    }
}
