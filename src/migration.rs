//! Import of legacy proxy list files and export of stored metadata

use crate::error::Result;
use crate::gateway::GatewayApi;
use crate::manager::ProxyManager;
use crate::proxy::ProxyList;
use crate::store::write_atomic;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Where the source file was moved after a successful import
    pub backup: Option<PathBuf>,
}

impl<G: GatewayApi> ProxyManager<G> {
    /// Create every enabled proxy listed in a `{"proxies": [...]}` file
    ///
    /// A missing file is a no-op. After at least one import the file is
    /// renamed to `<file>.migrated.bak` so it is not imported twice.
    pub async fn import_file(&self, path: &Path) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No proxies file found at {}, skipping import", path.display());
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };
        let list: ProxyList = serde_json::from_slice(&data)?;
        info!("Importing {} proxies from {}", list.proxies.len(), path.display());

        for proxy in list.proxies {
            if !proxy.enabled {
                info!("Skipping disabled proxy {}", proxy.id);
                report.skipped += 1;
                continue;
            }
            let label = format!("{}:{} -> {}", proxy.hostname, proxy.port, proxy.target);
            match self.create(proxy).await {
                Ok(created) => {
                    info!("Imported proxy {} ({})", created.id, label);
                    report.imported += 1;
                }
                Err(e) => {
                    warn!("Failed to import proxy {}: {}", label, e);
                    report.failed += 1;
                }
            }
        }

        if report.imported > 0 {
            let mut backup = path.as_os_str().to_owned();
            backup.push(".migrated.bak");
            let backup = PathBuf::from(backup);
            match fs::rename(path, &backup) {
                Ok(()) => {
                    info!("Old proxies file backed up to {}", backup.display());
                    report.backup = Some(backup);
                }
                Err(e) => warn!("Could not back up old proxies file: {}", e),
            }
        }

        info!(
            "Import complete: {} imported, {} skipped, {} failed",
            report.imported, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Write the stored records to `path` in the same list format
    pub fn export_file(&self, path: &Path) -> Result<usize> {
        let proxies = self.list()?;
        let count = proxies.len();
        let data = serde_json::to_vec_pretty(&ProxyList { proxies })?;
        write_atomic(path, &data)?;
        info!("Exported {} proxies to {}", count, path.display());
        Ok(count)
    }
}
