//! ProxySync - keeps a gateway's live reverse-proxy config in sync with a
//! declarative proxy list
//!
//! This crate provides:
//! - A stored list of proxy records (hostname:port -> target, TLS and header options)
//! - Translation of records to gateway routes and back
//! - Create/update/delete/toggle applied through the gateway's admin API
//! - Server name tracking that survives restarts and out-of-band edits
//! - Startup discovery that reconciles stored records with the live gateway

pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod migration;
pub mod proxy;
pub mod route;
pub mod server_map;
pub mod store;

pub use config::{GatewayArgs, GatewayConfig};
pub use discovery::{AutostartReport, DiscoveryReport};
pub use error::{Error, Result, Step};
pub use gateway::{AdminClient, GatewayApi, GatewayResponse};
pub use manager::ProxyManager;
pub use migration::ImportReport;
pub use proxy::{ProxyList, ProxyRecord};
pub use server_map::ServerMap;
pub use store::ProxyStore;
