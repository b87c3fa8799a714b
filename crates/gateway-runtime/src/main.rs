//! # Access Gateway
//!
//! Terminates PSK-authenticated secure sessions from devices, accepts
//! `POST accessControl` requests over them and relays the upstream
//! authority's verdict.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use gateway_runtime::{init_logging, Gateway, GatewayConfig};

#[derive(Parser, Debug)]
#[command(name = "gateway-runtime")]
#[command(about = "PSK-secured access-control gateway")]
struct Args {
    /// Configuration file; created with defaults if missing
    #[arg(short, long, default_value = "gateway.toml")]
    config: PathBuf,

    /// Secure port, overrides the configuration and GW_SECURE_PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let created = !args.config.exists();
    let mut config = GatewayConfig::load_or_create(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    config
        .apply_env_overrides(|var| std::env::var(var).ok())
        .context("Invalid environment override")?;
    if let Some(port) = args.port {
        config.network.secure_port = port;
    }
    config.validate().context("Invalid configuration")?;

    init_logging(&config.logging)?;
    if created {
        info!(path = %args.config.display(), "wrote default configuration");
    }

    let gateway = Gateway::bind(config).await?;
    let shutdown = gateway.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!(error = %err, "Cannot listen for Ctrl+C, stopping"),
        }
        let _ = shutdown.send(true);
    });

    gateway.run().await
}
