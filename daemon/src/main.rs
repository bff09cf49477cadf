//! portknock daemon
//!
//! Listens on every port of the configured knock sequence and grants
//! access to source addresses that complete it.

mod config;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use portknock_listener::KnockServer;
use portknock_tracker::LogGranter;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::DaemonConfig;

/// portknockd - TCP port knocking server
#[derive(Parser, Debug)]
#[command(name = "portknockd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "portknockd.toml")]
    config: String,

    /// Additional configuration merged over the main file
    #[arg(long)]
    overlay: Option<String>,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("portknockd v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = DaemonConfig::load(&args.config).await?;
    info!("Loaded configuration from {}", args.config);
    if let Some(overlay) = &args.overlay {
        config.load_merge(overlay).await?;
        info!("Merged configuration from {}", overlay);
    }
    config.validate()?;

    // Binding every knock port is all-or-nothing
    let server = KnockServer::start(config.engine_config(), Arc::new(LogGranter)).await?;

    // Start metrics server
    let metrics_handle = metrics::start_server(&config.monitoring, server.tracker().clone());

    let signal = server
        .run_until(async {
            let result = tokio::signal::ctrl_c().await;
            if result.is_ok() {
                info!("Shutdown signal received");
            }
            result
        })
        .await;

    // Cleanup
    metrics_handle.abort();

    signal.context("Failed to listen for shutdown signal")?;
    info!("portknockd stopped");

    Ok(())
}
