//! ProxySync - boot-time reconciliation
//!
//! Runs discovery against the gateway once, then enables every stored proxy
//! flagged for autostart.

use anyhow::{Context, Result};
use clap::Parser;
use proxysync::{GatewayArgs, GatewayConfig, ProxyManager};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

/// ProxySync - reconcile stored proxies with the gateway
#[derive(Parser, Debug)]
#[command(name = "proxysync")]
#[command(author = "ProxySync Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Reconcile stored reverse proxies with the gateway and autostart them")]
struct Args {
    #[command(flatten)]
    gateway: GatewayArgs,

    /// Only run discovery, do not autostart proxies
    #[arg(long)]
    no_autostart: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_max_level(args.gateway.max_level())
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting ProxySync v1.0.0");
    let config = GatewayConfig::from(args.gateway);
    info!("Gateway admin API: {}", config.admin_url);
    info!("Server map: {}", config.server_map_path.display());
    info!("Proxy metadata: {}", config.metadata_path().display());

    let manager = ProxyManager::from_config(&config).context("create proxy manager")?;

    if let Err(e) = manager.status().await {
        warn!("Gateway admin API not reachable: {}", e);
    }

    let report = manager.discover().await.context("discovery")?;
    info!(
        "Discovery: {} new, {} matched, {} disabled, {} skipped routes, {} total",
        report.discovered, report.updated, report.disabled, report.skipped, report.total
    );

    if !args.no_autostart {
        let started = manager.autostart().await.context("autostart")?;
        info!(
            "Autostart: {} started, {} failed",
            started.started, started.failed
        );
    }

    info!("ProxySync finished");
    Ok(())
}
