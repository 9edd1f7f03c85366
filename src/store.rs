//! Proxy metadata store
//!
//! The authoritative desired-state list, persisted as `{"proxies": [...]}`.
//! Every mutation is a full load-modify-save cycle; the cycles are serialized
//! behind a lock and the file is replaced atomically.

use crate::error::{Error, Result};
use crate::proxy::{ProxyList, ProxyRecord};
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed store of proxy records
pub struct ProxyStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProxyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored records; a missing file is an empty list
    pub fn load(&self) -> Result<Vec<ProxyRecord>> {
        let _guard = self.lock.lock();
        self.read()
    }

    /// Replace the stored list
    pub fn save(&self, proxies: &[ProxyRecord]) -> Result<()> {
        let _guard = self.lock.lock();
        self.write(proxies)
    }

    pub fn add(&self, proxy: ProxyRecord) -> Result<()> {
        let _guard = self.lock.lock();
        let mut proxies = self.read()?;
        if proxies.iter().any(|p| p.id == proxy.id) {
            return Err(Error::Validation(format!(
                "proxy with ID {} already exists",
                proxy.id
            )));
        }
        proxies.push(proxy);
        self.write(&proxies)
    }

    pub fn update(&self, proxy: ProxyRecord) -> Result<()> {
        let _guard = self.lock.lock();
        let mut proxies = self.read()?;
        let slot = proxies
            .iter_mut()
            .find(|p| p.id == proxy.id)
            .ok_or_else(|| Error::NotFound(format!("proxy with ID {}", proxy.id)))?;
        *slot = proxy;
        self.write(&proxies)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let mut proxies = self.read()?;
        let before = proxies.len();
        proxies.retain(|p| p.id != id);
        if proxies.len() == before {
            return Err(Error::NotFound(format!("proxy with ID {}", id)));
        }
        self.write(&proxies)
    }

    pub fn get(&self, id: &str) -> Result<ProxyRecord> {
        self.load()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::NotFound(format!("proxy with ID {}", id)))
    }

    fn read(&self) -> Result<Vec<ProxyRecord>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let list: ProxyList = serde_json::from_slice(&data)?;
        Ok(list.proxies)
    }

    fn write(&self, proxies: &[ProxyRecord]) -> Result<()> {
        let list = ProxyList {
            proxies: proxies.to_vec(),
        };
        let data = serde_json::to_vec_pretty(&list)?;
        write_atomic(&self.path, &data)?;
        debug!("Saved {} proxy records to {}", proxies.len(), self.path.display());
        Ok(())
    }
}

/// Write via a sibling temp file and rename over the target
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)
}
