//! portknock client
//!
//! Sends the configured knock sequence to a target host and exits.

use anyhow::Result;
use clap::Parser;
use portknock_client::Knocker;
use portknock_client::config::ClientConfig;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// portknock - send a port knocking sequence
#[derive(Parser, Debug)]
#[command(name = "portknock")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Host to knock, overrides the configured target
    #[arg(long)]
    host: Option<String>,

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

    let config = match &args.config {
        Some(path) => {
            let config = ClientConfig::load(path).await?;
            info!("Loaded configuration from {}", path);
            config
        }
        None => ClientConfig::default(),
    };

    let host = args.host.unwrap_or(config.target.host);
    let knocker = Knocker::new((&config.client).into());

    info!(
        "Knocking {} ({} steps, {} attempts, {:?} apart)",
        host,
        config.knock.steps.len(),
        config.knock.steps.total_knocks(),
        knocker.config().delay
    );
    knocker.knock(&host, &config.knock.steps).await?;

    Ok(())
}
