//! Identity gateway configuration and cache daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   gateway-store.json ──▶ store ──▶ routing translator ──▶ ConfigSnapshot
//!         │                  │                                   │
//!   (notify watcher,         │                           SnapshotProvider
//!    SIGHUP, admin reload)   │                          (ArcSwap + signal)
//!                            │                                   │
//!                            └──▶ cache warmup ──▶ CacheService ─┤
//!                                                  (memory/redis) │
//!                                                                 ▼
//!                                                          admin API (axum)
//! ```

use std::path::PathBuf;

use clap::Parser;

use identity_gateway::config::{self, GatewayConfig};
use identity_gateway::lifecycle::Gateway;
use identity_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "identity-gateway")]
#[command(about = "Route configuration and identity cache service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "IDGW_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => {
            let config = GatewayConfig::default();
            config::validation::validate_config(&config).map_err(config::ConfigError::Validation)?;
            config
        }
    };

    logging::init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "identity-gateway starting");
    tracing::info!(
        config_file = ?args.config,
        store = ?config.store.path,
        cache_backend = ?config.cache.backend,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let gateway = Gateway::build(config).await?;
    gateway.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
