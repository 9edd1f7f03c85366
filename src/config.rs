//! Runtime configuration shared by the binaries

use clap::Args;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_ADMIN_URL: &str = "http://localhost:2019";
pub const DEFAULT_MAX_LOG_BODY_SIZE: usize = 200;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const SERVER_MAP_SUFFIX: &str = "_servers.json";
const METADATA_SUFFIX: &str = "_proxies.json";

/// Gateway connection and state file settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub admin_url: String,
    pub server_map_path: PathBuf,
    /// Preview length for logged bodies, 0 logs bodies in full
    pub max_log_body_size: usize,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            admin_url: DEFAULT_ADMIN_URL.to_string(),
            server_map_path: PathBuf::from("./data/gateway_servers.json"),
            max_log_body_size: DEFAULT_MAX_LOG_BODY_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GatewayConfig {
    /// Path of the proxy metadata file, derived from the server map path
    pub fn metadata_path(&self) -> PathBuf {
        metadata_path_for(&self.server_map_path)
    }
}

/// `foo_servers.json` -> `foo_proxies.json`; other names get the suffix appended
pub fn metadata_path_for(server_map_path: &Path) -> PathBuf {
    let raw = server_map_path.to_string_lossy();
    let stem = raw.strip_suffix(SERVER_MAP_SUFFIX).unwrap_or(&raw);
    PathBuf::from(format!("{}{}", stem, METADATA_SUFFIX))
}

/// Command line / environment flags for the gateway connection
#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    /// Gateway admin API base URL
    #[arg(long, env = "GATEWAY_ADMIN_URL", default_value = DEFAULT_ADMIN_URL)]
    pub admin_url: String,

    /// Server map file (the proxy metadata file lives next to it)
    #[arg(long = "server-map", env = "SERVER_MAP_PATH", default_value = "./data/gateway_servers.json")]
    pub server_map_path: PathBuf,

    /// Max characters of request/response bodies to log (0 = unlimited)
    #[arg(long = "max-log-body", env = "MAX_LOG_BODY_SIZE", default_value_t = DEFAULT_MAX_LOG_BODY_SIZE)]
    pub max_log_body_size: usize,

    /// Gateway request timeout in seconds
    #[arg(long, env = "GATEWAY_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl GatewayArgs {
    /// Subscriber level for `--log-level`; unknown names fall back to INFO
    pub fn max_level(&self) -> Level {
        match self.log_level.trim().to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

impl From<GatewayArgs> for GatewayConfig {
    fn from(args: GatewayArgs) -> Self {
        Self {
            admin_url: args.admin_url,
            server_map_path: args.server_map_path,
            max_log_body_size: args.max_log_body_size,
            request_timeout: Duration::from_secs(args.timeout_secs),
        }
    }
}
