//! mapgate: reverse-proxy gateway for geospatial REST services.
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                   GATEWAY                     │
//!   Client Request       │  ┌─────────┐   ┌──────────────┐   ┌─────────┐ │
//!   ─────────────────────┼─▶│  http   │──▶│   routing    │──▶│ forward │─┼──▶ Upstream
//!                        │  │ server  │   │ ProxyRouter  │   │Forwarder│ │    Service
//!                        │  └─────────┘   │ + handlers   │   └────┬────┘ │
//!                        │       ▲        └──────────────┘        │      │
//!   Client Response      │       │   CORS, 502/504, host rewrite  │      │
//!   ◀────────────────────┼───────┴────────────────────────────────┘      │
//!                        │                                               │
//!                        │  config · net registry · lifecycle · metrics  │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mapgate::config::{load_config, ObservabilityConfig, ProxyConfig};
use mapgate::forward::tls;
use mapgate::lifecycle::shutdown_signal;
use mapgate::observability::{logging, metrics};
use mapgate::Proxy;

#[derive(Parser)]
#[command(name = "mapgate")]
#[command(about = "Reverse-proxy gateway for geospatial REST services", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in reference routers when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Do not verify upstream TLS certificates.
    #[arg(long)]
    allow_tls_unauthorized: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(err) => {
                logging::init_logging(&ObservabilityConfig::default());
                tracing::error!(path = %path.display(), error = %err, "Failed to load configuration");
                return Err(err.into());
            }
        },
        None => ProxyConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if cli.allow_tls_unauthorized {
        tls::allow_unauthorized();
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mapgate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routers = config.routers.len(),
        connect_ms = config.timeouts.connect_ms,
        keep_alive_ms = config.timeouts.keep_alive_ms,
        forward_timeout_ms = config.forwarder.timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                metrics::init_metrics(addr);
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let proxy = Arc::new(Proxy::new(config)?);
    proxy.start().await?;

    shutdown_signal().await;
    proxy.destroy();

    tracing::info!("Shutdown complete");
    Ok(())
}
