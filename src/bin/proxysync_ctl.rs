//! CLI tool for managing gateway reverse proxies
//!
//! Usage:
//!   proxysync-ctl add <hostname> <port> <target> [options]
//!   proxysync-ctl update <id> [options]
//!   proxysync-ctl toggle <id> <true|false>
//!   proxysync-ctl delete|get <id>
//!   proxysync-ctl list [--json]
//!   proxysync-ctl status | upstreams | discover
//!   proxysync-ctl import <file> | export <file>
//!   proxysync-ctl config-get [path] | id-get <id> | id-delete <id> | load <file>

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use proxysync::{GatewayApi, GatewayArgs, GatewayConfig, ProxyManager, ProxyRecord};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::FmtSubscriber;

/// CLI tool for managing gateway reverse proxies
#[derive(Parser, Debug)]
#[command(name = "proxysync-ctl")]
#[command(author = "ProxySync Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Manage reverse proxies through the gateway admin API")]
struct Args {
    #[command(flatten)]
    gateway: GatewayArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a new proxy
    Add {
        /// Hostname to match (e.g., app.example.com)
        hostname: String,

        /// Port the gateway listens on for this proxy
        port: u16,

        /// Backend dial address (host:port or scheme://host:port)
        target: String,

        /// Use TLS towards the backend
        #[arg(long)]
        tls: bool,

        /// CA bundle used to verify the backend (implies --tls)
        #[arg(long)]
        ca_file: Option<String>,

        /// Trust private and loopback ranges as proxies
        #[arg(long)]
        trusted_proxies: bool,

        /// Extra upstream request header, NAME=VALUE (repeatable)
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        /// Store the proxy without creating a gateway route
        #[arg(long)]
        disabled: bool,

        /// Enable the proxy automatically at boot
        #[arg(long)]
        autostart: bool,

        /// Explicit proxy ID (generated when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Update an existing proxy
    Update {
        /// Proxy ID
        id: String,

        #[arg(long)]
        hostname: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        target: Option<String>,

        #[arg(long)]
        tls: Option<bool>,

        #[arg(long)]
        ca_file: Option<String>,

        #[arg(long)]
        trusted_proxies: Option<bool>,

        /// Replace all custom headers, NAME=VALUE (repeatable)
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,

        #[arg(long)]
        enabled: Option<bool>,

        #[arg(long)]
        autostart: Option<bool>,
    },

    /// Enable or disable a proxy; disabling keeps its settings
    Toggle {
        id: String,

        /// true to create the gateway route, false to remove it
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },

    /// Delete a proxy
    Delete { id: String },

    /// Show one proxy
    Get {
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all proxies
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the gateway admin API is reachable
    Status,

    /// Show reverse proxy upstream health counters
    Upstreams,

    /// Reconcile stored proxies with the gateway's live config
    Discover,

    /// Import proxies from a legacy proxy list file
    Import { file: PathBuf },

    /// Export stored proxies to a file
    Export { file: PathBuf },

    /// Print gateway config at a path
    ConfigGet {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print the gateway object tagged with an @id
    IdGet { id: String },

    /// Delete the gateway object tagged with an @id
    IdDelete { id: String },

    /// Replace the whole gateway config with a JSON file
    Load { file: PathBuf },
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name is empty".to_string());
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_max_level(args.gateway.max_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = GatewayConfig::from(args.gateway);
    let manager = ProxyManager::from_config(&config).context("create proxy manager")?;

    match args.command {
        Commands::Add {
            hostname,
            port,
            target,
            tls,
            ca_file,
            trusted_proxies,
            headers,
            disabled,
            autostart,
            id,
        } => {
            let proxy = ProxyRecord {
                id: id.unwrap_or_default(),
                tls_enabled: tls,
                tls_cert_file: ca_file,
                trusted_proxies,
                custom_headers: headers.into_iter().collect(),
                enabled: !disabled,
                autostart,
                ..ProxyRecord::new(&hostname, port, &target)
            };
            let created = manager.create(proxy).await.context("add proxy")?;
            println!("Added proxy:");
            print_proxy(&created);
        }

        Commands::Update {
            id,
            hostname,
            port,
            target,
            tls,
            ca_file,
            trusted_proxies,
            headers,
            enabled,
            autostart,
        } => {
            let mut proxy = manager.get(&id).context("find proxy")?;
            if let Some(hostname) = hostname {
                proxy.hostname = hostname;
            }
            if let Some(port) = port {
                proxy.port = port;
            }
            if let Some(target) = target {
                proxy.target = target;
            }
            if let Some(tls) = tls {
                proxy.tls_enabled = tls;
            }
            if let Some(ca_file) = ca_file {
                proxy.tls_cert_file = Some(ca_file).filter(|f| !f.is_empty());
            }
            if let Some(trusted) = trusted_proxies {
                proxy.trusted_proxies = trusted;
            }
            if !headers.is_empty() {
                proxy.custom_headers = headers.into_iter().collect::<BTreeMap<_, _>>();
            }
            if let Some(enabled) = enabled {
                proxy.enabled = enabled;
            }
            if let Some(autostart) = autostart {
                proxy.autostart = autostart;
            }
            manager.update(proxy).await.context("update proxy")?;
            println!("Updated proxy {}", id);
        }

        Commands::Toggle { id, enabled } => {
            manager.toggle(&id, enabled).await.context("toggle proxy")?;
            println!(
                "{} proxy {}",
                if enabled { "Enabled" } else { "Disabled" },
                id
            );
        }

        Commands::Delete { id } => {
            manager.delete(&id).await.context("delete proxy")?;
            println!("Deleted proxy {}", id);
        }

        Commands::Get { id, json } => {
            let proxy = manager.get(&id).context("get proxy")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&proxy)?);
            } else {
                print_proxy(&proxy);
            }
        }

        Commands::List { json } => {
            let proxies = manager.list().context("list proxies")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&proxies)?);
                return Ok(());
            }

            if proxies.is_empty() {
                println!("No proxies found");
                return Ok(());
            }

            println!(
                "{:<34} {:<36} {:<6} {:<30} {:<8} {:<9}",
                "ID", "HOSTNAME", "PORT", "TARGET", "ENABLED", "AUTOSTART"
            );
            println!("{}", "-".repeat(128));
            for proxy in &proxies {
                println!(
                    "{:<34} {:<36} {:<6} {:<30} {:<8} {:<9}",
                    proxy.id, proxy.hostname, proxy.port, proxy.target, proxy.enabled, proxy.autostart
                );
            }
            println!("\nTotal: {} proxy(s)", proxies.len());
        }

        Commands::Status => match manager.status().await {
            Ok(()) => println!("Gateway admin API at {} is reachable", config.admin_url),
            Err(e) => {
                eprintln!("Gateway admin API at {} is not reachable: {}", config.admin_url, e);
                std::process::exit(1);
            }
        },

        Commands::Upstreams => {
            let upstreams = manager.upstreams().await.context("get upstreams")?;
            if upstreams.is_empty() {
                println!("No upstreams reported");
            }
            for upstream in upstreams {
                println!(
                    "{:<40} requests={:<6} fails={}",
                    upstream.address, upstream.num_requests, upstream.fails
                );
            }
        }

        Commands::Discover => {
            let report = manager.discover().await.context("discover proxies")?;
            println!(
                "{} new, {} matched, {} disabled, {} skipped, {} total{}",
                report.discovered,
                report.updated,
                report.disabled,
                report.skipped,
                report.total,
                if report.written { " (metadata updated)" } else { "" }
            );
        }

        Commands::Import { file } => {
            let report = manager.import_file(&file).await.context("import proxies")?;
            println!(
                "Imported {}, skipped {}, failed {}",
                report.imported, report.skipped, report.failed
            );
            if let Some(backup) = report.backup {
                println!("Source file moved to {}", backup.display());
            }
        }

        Commands::Export { file } => {
            let count = manager.export_file(&file).context("export proxies")?;
            println!("Exported {} proxy(s) to {}", count, file.display());
        }

        Commands::ConfigGet { path } => {
            let value = manager.gateway().get_config(&path).await.context("get config")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }

        Commands::IdGet { id } => {
            let value = manager.gateway().get_by_id(&id).await.context("get by id")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }

        Commands::IdDelete { id } => {
            manager.gateway().delete_by_id(&id).await.context("delete by id")?;
            println!("Deleted gateway object {}", id);
        }

        Commands::Load { file } => {
            let data = std::fs::read(&file)
                .with_context(|| format!("read {}", file.display()))?;
            let value: serde_json::Value = serde_json::from_slice(&data)
                .with_context(|| format!("parse {}", file.display()))?;
            manager.gateway().load(&value).await.context("load config")?;
            println!("Loaded gateway config from {}", file.display());
        }
    }

    Ok(())
}

fn print_proxy(proxy: &ProxyRecord) {
    println!("  ID:         {}", proxy.id);
    println!("  Hostname:   {}", proxy.hostname);
    println!("  Port:       {}", proxy.port);
    println!("  Target:     {}", proxy.target);
    println!("  TLS:        {}", proxy.tls_enabled);
    if let Some(ref ca) = proxy.tls_cert_file {
        println!("  CA file:    {}", ca);
    }
    println!("  Trusted:    {}", proxy.trusted_proxies);
    for (name, value) in &proxy.custom_headers {
        println!("  Header:     {}: {}", name, value);
    }
    println!("  Enabled:    {}", proxy.enabled);
    println!("  Autostart:  {}", proxy.autostart);
}
