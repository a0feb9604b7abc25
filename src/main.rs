//! Shadow traffic proxy.
//!
//! Every inbound request is forwarded to a primary and a shadow backend. The
//! caller receives the primary response; the two responses are compared in the
//! background and each difference is reported as a structured `response-diff`
//! event and as metrics.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                 SHADOW PROXY                 │
//!   Client Request   │  ┌────────┐   ┌────────────┐   ┌───────────┐ │
//!   ─────────────────┼─▶│  http  │──▶│   mirror   │──▶│  primary  │─┼──▶ Primary
//!                    │  │ server │   │ dispatcher │   │ transport │ │
//!   Client Response  │  │        │◀──│            │◀──│           │◀┼─── Backend
//!   ◀────────────────┼──│        │   │            │   └───────────┘ │
//!                    │  └────────┘   │            │   ┌───────────┐ │
//!                    │               │            │──▶│  shadow   │─┼──▶ Shadow
//!                    │               │            │◀──│ transport │◀┼─── Backend
//!                    │               └─────┬──────┘   └───────────┘ │
//!                    │                     ▼ background             │
//!                    │               ┌────────────┐   ┌───────────┐ │
//!                    │               │  response  │──▶│   sink    │─┼──▶ logs, metrics
//!                    │               │    diff    │   └───────────┘ │
//!                    │               └────────────┘                 │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use shadow_proxy::config::{load_config, ConfigWatcher, ProxyConfig};
use shadow_proxy::http::HttpServer;
use shadow_proxy::lifecycle::{wait_for_signal, Shutdown};
use shadow_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "shadow-proxy")]
#[command(about = "Mirror traffic to a shadow backend and diff the responses", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload mirror settings when the configuration file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if cli.check {
        println!("configuration ok");
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "shadow-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        primary = %config.primary.url,
        shadow = %config.shadow.url,
        wait_for_shadow = config.mirror.wait_for_shadow,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    // Keep the watcher handle alive for the lifetime of the server.
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(wait_for_signal(shutdown));

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
