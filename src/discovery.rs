//! Startup reconciliation
//!
//! Walks every gateway server and route, turns the reverse-proxy routes back
//! into records and merges them with stored metadata. Stored records keep
//! their `autostart` flag; anything found live is enabled; stored records
//! missing from the gateway are kept but disabled.
//!
//! A route matched to a stored record by hostname:port takes the stored id,
//! even when the route carries an `@id` of its own.

use crate::error::{Result, Step, StepExt};
use crate::gateway::GatewayApi;
use crate::manager::{remember, ProxyManager};
use crate::proxy::{generate_id, ProxyRecord};
use crate::route::parse_route_value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Outcome of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Live routes with no stored record
    pub discovered: usize,
    /// Live routes matched to a stored record
    pub updated: usize,
    /// Stored records not found live
    pub disabled: usize,
    /// Routes that are not reverse proxies or could not be parsed
    pub skipped: usize,
    pub total: usize,
    /// Whether the metadata file was rewritten
    pub written: bool,
}

/// Outcome of the autostart pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutostartReport {
    pub started: usize,
    pub failed: usize,
}

impl<G: GatewayApi> ProxyManager<G> {
    /// Resynchronize metadata and the server map with the gateway's live state
    ///
    /// An unreachable gateway skips the pass without touching metadata.
    pub async fn discover(&self) -> Result<DiscoveryReport> {
        info!("Discovering existing proxies in gateway...");
        let mut report = DiscoveryReport::default();

        let existing = self.store.load().step(Step::LoadMetadata)?;
        let by_id: HashMap<&str, &ProxyRecord> = existing
            .iter()
            .filter(|p| !p.id.is_empty())
            .map(|p| (p.id.as_str(), p))
            .collect();
        let by_host_port: HashMap<String, &ProxyRecord> = existing
            .iter()
            .filter_map(|p| p.host_port_key().map(|key| (key, p)))
            .collect();

        let servers = match self.gateway.list_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!("Failed to list gateway servers for discovery: {}", e);
                return Ok(report);
            }
        };

        let mut merged: Vec<ProxyRecord> = Vec::new();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut map = self.server_map.lock().await;

        for (server_name, server) in &servers {
            for (index, raw) in server.routes.iter().enumerate() {
                let mut proxy = match parse_route_value(raw, &server.listen) {
                    Ok(proxy) => proxy,
                    Err(e) => {
                        warn!("Skipping route in server {}: {}", server_name, e);
                        report.skipped += 1;
                        continue;
                    }
                };
                if proxy.id.is_empty() && proxy.host_port_key().is_none() {
                    proxy.id = positional_id(server_name, index);
                }

                let mut matched = by_id.get(proxy.id.as_str()).copied();
                if matched.is_none() {
                    if let Some(existing) =
                        proxy.host_port_key().and_then(|key| by_host_port.get(&key).copied())
                    {
                        if proxy.id != existing.id {
                            debug!(
                                "Matched route {:?} by hostname:port, using stored ID {}",
                                proxy.id, existing.id
                            );
                            proxy.id = existing.id.clone();
                        }
                        matched = Some(existing);
                    }
                }

                if proxy.id.is_empty() {
                    proxy.id = generate_id();
                    info!(
                        "Generated ID {} for route without one: {}:{}",
                        proxy.id, proxy.hostname, proxy.port
                    );
                }
                if claimed.contains(&proxy.id) {
                    warn!(
                        "Proxy {} appears more than once in the gateway, keeping the first (server {})",
                        proxy.id, server_name
                    );
                    continue;
                }

                proxy.enabled = true;
                match matched {
                    Some(existing) => {
                        proxy.autostart = existing.autostart;
                        debug!("Found stored proxy {} ({})", proxy.id, proxy.hostname);
                        report.updated += 1;
                    }
                    None => {
                        proxy.autostart = true;
                        info!(
                            "Discovered new proxy in gateway: {}:{} -> {} (ID: {})",
                            proxy.hostname, proxy.port, proxy.target, proxy.id
                        );
                        report.discovered += 1;
                    }
                }
                claimed.insert(proxy.id.clone());

                remember(&mut map, &proxy, server_name);
                merged.push(proxy);
            }
        }
        drop(map);

        for stored in &existing {
            if claimed.contains(&stored.id) {
                continue;
            }
            let mut stored = stored.clone();
            stored.enabled = false;
            debug!("Keeping stored proxy {} as disabled", stored.id);
            merged.push(stored);
            report.disabled += 1;
        }
        report.total = merged.len();

        if same_records(&existing, &merged) {
            if merged.is_empty() {
                info!("No proxies found in gateway");
            } else {
                info!("No changes detected, {} proxies already tracked", merged.len());
            }
            return Ok(report);
        }

        info!(
            "Syncing proxy metadata: {} new, {} updated, {} total",
            report.discovered, report.updated, report.total
        );
        self.store.save(&merged).step(Step::PersistMetadata)?;
        report.written = true;
        Ok(report)
    }

    /// Enable every stored record flagged `autostart` that is currently disabled
    pub async fn autostart(&self) -> Result<AutostartReport> {
        let mut report = AutostartReport::default();
        let pending: Vec<ProxyRecord> = self
            .list()?
            .into_iter()
            .filter(|p| p.autostart && !p.enabled)
            .collect();

        for proxy in pending {
            match self.toggle(&proxy.id, true).await {
                Ok(()) => {
                    info!("Autostarted proxy {} ({})", proxy.id, proxy.hostname);
                    report.started += 1;
                }
                Err(e) => {
                    warn!("Failed to autostart proxy {}: {}", proxy.id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Id for a route that carries no `@id` and no hostname:port to match on,
/// stable for as long as the route keeps its place in the server
fn positional_id(server_name: &str, index: usize) -> String {
    format!("{}-route{}", server_name, index)
}

/// Equal as sets of records, ignoring order
fn same_records(a: &[ProxyRecord], b: &[ProxyRecord]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&ProxyRecord> = a.iter().collect();
    let mut b: Vec<&ProxyRecord> = b.iter().collect();
    a.sort_by(|x, y| x.id.cmp(&y.id));
    b.sort_by(|x, y| x.id.cmp(&y.id));
    a == b
}
