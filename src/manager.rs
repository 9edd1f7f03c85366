//! Proxy manager
//!
//! Drives each proxy through absent -> stored (disabled) -> live (route in the
//! gateway). Metadata is written first so a gateway failure never loses the
//! desired state; only `create` rolls the metadata back.

use crate::config::GatewayConfig;
use crate::error::{Error, Result, Step, StepExt};
use crate::gateway::types::{GatewayRoute, UpstreamStatus};
use crate::gateway::{server_path, AdminClient, GatewayApi};
use crate::proxy::{generate_id, ProxyRecord};
use crate::route::{build_server, parse_route, route_has_id};
use crate::server_map::ServerMap;
use crate::store::ProxyStore;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub struct ProxyManager<G> {
    pub(crate) gateway: G,
    pub(crate) store: ProxyStore,
    /// Allocation, lookup and mapping updates all contend on this lock
    pub(crate) server_map: Mutex<ServerMap>,
}

impl ProxyManager<AdminClient> {
    /// Manager talking to the admin API described by `config`
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let client = AdminClient::new(config)?;
        Ok(Self::open(client, config))
    }
}

impl<G: GatewayApi> ProxyManager<G> {
    pub fn new(gateway: G, store: ProxyStore, server_map: ServerMap) -> Self {
        Self {
            gateway,
            store,
            server_map: Mutex::new(server_map),
        }
    }

    /// Load the server map and metadata paths from `config`
    ///
    /// An unreadable server map is replaced by an empty one.
    pub fn open(gateway: G, config: &GatewayConfig) -> Self {
        let server_map = ServerMap::load(&config.server_map_path).unwrap_or_else(|e| {
            error!("Failed to load server map, starting empty: {}", e);
            ServerMap::empty_at(&config.server_map_path)
        });
        Self::new(gateway, ProxyStore::new(config.metadata_path()), server_map)
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn store(&self) -> &ProxyStore {
        &self.store
    }

    /// Store a new proxy and, when enabled, give it its own gateway server
    pub async fn create(&self, mut proxy: ProxyRecord) -> Result<ProxyRecord> {
        proxy.normalize();
        proxy.validate()?;
        if proxy.id.is_empty() {
            proxy.id = generate_id();
        }
        debug!(
            "Creating proxy {}:{} -> {} (ID: {})",
            proxy.hostname, proxy.port, proxy.target, proxy.id
        );

        self.store.add(proxy.clone()).step(Step::PersistMetadata)?;

        if proxy.enabled {
            if let Err(e) = self.create_server(&proxy).await {
                error!("Failed to create gateway server for proxy {}: {}", proxy.id, e);
                if let Err(cleanup) = self.store.delete(&proxy.id) {
                    warn!("Failed to roll back metadata for proxy {}: {}", proxy.id, cleanup);
                }
                return Err(e);
            }
        } else {
            debug!("Proxy {} created disabled, skipping gateway", proxy.id);
        }

        info!(
            "Added proxy: {}:{} -> {} (ID: {}, Enabled: {})",
            proxy.hostname, proxy.port, proxy.target, proxy.id, proxy.enabled
        );
        Ok(proxy)
    }

    pub fn get(&self, id: &str) -> Result<ProxyRecord> {
        self.store.get(id)
    }

    /// Stored records; the gateway is not consulted
    pub fn list(&self) -> Result<Vec<ProxyRecord>> {
        self.store.load().step(Step::LoadMetadata)
    }

    /// Persist `proxy` and bring the gateway in line with its `enabled` flag
    pub async fn update(&self, mut proxy: ProxyRecord) -> Result<()> {
        if proxy.id.trim().is_empty() {
            error!("Update called with empty proxy ID");
            return Err(Error::Validation("proxy ID is required for update".into()));
        }
        proxy.normalize();
        proxy.validate()?;
        debug!(
            "Updating proxy {} ({}:{} -> {})",
            proxy.id, proxy.hostname, proxy.port, proxy.target
        );

        self.store.update(proxy.clone()).step(Step::PersistMetadata)?;

        if proxy.enabled {
            self.apply_server(&proxy).await?;
        } else {
            self.remove_server(&proxy).await?;
        }

        info!(
            "Updated proxy: {} (ID: {}, Enabled: {})",
            proxy.hostname, proxy.id, proxy.enabled
        );
        Ok(())
    }

    /// Remove the live server (best effort) and then the stored record
    pub async fn delete(&self, id: &str) -> Result<()> {
        debug!("Deleting proxy {}", id);
        let proxy = self.store.get(id).unwrap_or_else(|_| ProxyRecord {
            id: id.to_string(),
            ..Default::default()
        });

        {
            let mut map = self.server_map.lock().await;
            match self.lookup(&mut map, &proxy).await {
                Ok(Some(name)) => {
                    if let Err(e) = self.gateway.delete_config(&server_path(&name)).await {
                        warn!("Failed to delete server {} for proxy {}: {}", name, id, e);
                    }
                    forget(&mut map, id, &name);
                }
                Ok(None) => debug!("Proxy {} has no gateway server", id),
                Err(e) => warn!("Could not resolve gateway server for proxy {}: {}", id, e),
            }
        }

        self.store.delete(id).step(Step::PersistMetadata)?;
        info!("Deleted proxy: {}", id);
        Ok(())
    }

    pub async fn toggle(&self, id: &str, enabled: bool) -> Result<()> {
        let mut proxy = self.store.get(id).step(Step::LoadMetadata)?;
        proxy.enabled = enabled;
        self.update(proxy).await
    }

    /// Reachability probe; says nothing about config correctness
    pub async fn status(&self) -> Result<()> {
        self.gateway.get_config("/").await.map(drop)
    }

    pub async fn upstreams(&self) -> Result<Vec<UpstreamStatus>> {
        self.gateway.upstreams().await
    }

    async fn create_server(&self, proxy: &ProxyRecord) -> Result<()> {
        let server = build_server(proxy).step(Step::BuildRoute)?;
        let body = serde_json::to_value(&server)
            .map_err(Error::from)
            .step(Step::BuildRoute)?;

        let mut map = self.server_map.lock().await;
        let name = self.allocate(&mut map).await.step(Step::AllocateServerName)?;
        debug!("Creating server {} for proxy {}", name, proxy.id);
        self.gateway
            .put_config(&server_path(&name), &body)
            .await
            .step(Step::ApplyToGateway)?;
        remember(&mut map, proxy, &name);
        Ok(())
    }

    /// PATCH the proxy's server when it still exists, otherwise PUT a fresh one
    async fn apply_server(&self, proxy: &ProxyRecord) -> Result<()> {
        let server = build_server(proxy).step(Step::BuildRoute)?;
        let body = serde_json::to_value(&server)
            .map_err(Error::from)
            .step(Step::BuildRoute)?;

        let mut map = self.server_map.lock().await;
        let known = self
            .lookup(&mut map, proxy)
            .await
            .step(Step::ResolveServerName)?;

        let exists = match &known {
            Some(name) => self.gateway.server_exists(name).await,
            None => false,
        };
        let name = match known {
            Some(name) if exists => name,
            stale => {
                if let Some(stale) = stale {
                    debug!(
                        "Server {} is mapped to proxy {} but missing from the gateway",
                        stale, proxy.id
                    );
                    forget(&mut map, &proxy.id, &stale);
                }
                self.allocate(&mut map).await.step(Step::AllocateServerName)?
            }
        };

        let path = server_path(&name);
        let applied = if exists {
            debug!("Updating existing server {} for proxy {}", name, proxy.id);
            self.gateway.patch_config(&path, &body).await
        } else {
            debug!("Creating new server {} for proxy {}", name, proxy.id);
            self.gateway.put_config(&path, &body).await
        };
        applied.step(Step::ApplyToGateway)?;

        remember(&mut map, proxy, &name);
        Ok(())
    }

    /// Take a disabled proxy's server out of the gateway, keeping its metadata
    async fn remove_server(&self, proxy: &ProxyRecord) -> Result<()> {
        let mut map = self.server_map.lock().await;
        let name = match self.lookup(&mut map, proxy).await {
            Ok(Some(name)) => name,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Could not resolve gateway server for disabled proxy {}: {}", proxy.id, e);
                return Ok(());
            }
        };

        match self.gateway.delete_config(&server_path(&name)).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!("Server {} for proxy {} was already gone", name, proxy.id);
            }
            Err(e) => {
                return Err(Error::Step {
                    step: Step::ApplyToGateway,
                    source: Box::new(e),
                })
            }
        }
        forget(&mut map, &proxy.id, &name);
        debug!("Removed server {} for disabled proxy {}", name, proxy.id);
        Ok(())
    }

    pub(crate) async fn allocate(&self, map: &mut ServerMap) -> Result<String> {
        let servers = self.gateway.list_servers().await?;
        map.allocate(servers.into_keys())
    }

    /// Index hit first; on a miss, scan the gateway's routes by id or by
    /// hostname:port and repair the index from what is found
    pub(crate) async fn lookup(
        &self,
        map: &mut ServerMap,
        proxy: &ProxyRecord,
    ) -> Result<Option<String>> {
        let key = proxy.host_port_key();
        if let Some(name) = map.lookup(&proxy.id, key.as_deref()) {
            return Ok(Some(name));
        }

        let servers = self.gateway.list_servers().await?;
        for (name, server) in &servers {
            for raw in &server.routes {
                let Ok(route) = serde_json::from_value::<GatewayRoute>(raw.clone()) else {
                    continue;
                };
                let by_id = route_has_id(&route, &proxy.id);
                let by_host_port = key.is_some()
                    && parse_route(&route, &server.listen)
                        .map(|candidate| candidate.host_port_key() == key)
                        .unwrap_or(false);
                if by_id || by_host_port {
                    debug!("Found server {} for proxy {} in gateway", name, proxy.id);
                    remember(map, proxy, name);
                    return Ok(Some(name.clone()));
                }
            }
        }
        Ok(None)
    }
}

/// Record a mapping; persistence failures are logged, the in-memory map is kept
pub(crate) fn remember(map: &mut ServerMap, proxy: &ProxyRecord, server_name: &str) {
    if let Err(e) = map.record(proxy, server_name) {
        error!("Failed to save server map: {}", e);
    }
}

fn forget(map: &mut ServerMap, proxy_id: &str, server_name: &str) {
    if let Err(e) = map.remove(proxy_id, server_name) {
        error!("Failed to save server map: {}", e);
    }
}
