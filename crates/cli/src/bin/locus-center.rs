//! locus-center: registry of workers and data locations for a locus cluster.
//!
//! # Usage
//!
//! ```bash
//! locus-center --address 0.0.0.0:8787
//!
//! # Via config file or environment
//! locus-center --config locus.toml
//! LOCUS_CENTER_ADDRESS=0.0.0.0:8787 locus-center
//! ```

use std::sync::Arc;

use clap::Parser;
use locus_center::{Center, CenterClient};
use locus_wire::{Address, Network, ZmqNetwork};

/// Registry of workers and data locations for a locus cluster.
#[derive(Parser, Debug)]
#[command(name = "locus-center", version, about)]
struct Cli {
    /// Path to a locus.toml config file.
    #[arg(long, env = "LOCUS_CONFIG")]
    config: Option<String>,

    /// Address to listen on (host:port). Overrides `[center] address`.
    #[arg(long, env = "LOCUS_CENTER_ADDRESS")]
    address: Option<Address>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    locus_cli::init_tracing();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting locus-center");

    let config = locus_cli::load_config(cli.config.as_deref())?;
    let address = match cli.address {
        Some(address) => address,
        None => config.center_address()?,
    };

    let network: Arc<dyn Network> = Arc::new(ZmqNetwork::new(config.request_timeout()));
    let center = Center::start(Arc::clone(&network), address.clone()).await?;

    // A signal stops the center the same way a remote terminate does.
    let client = CenterClient::new(network, address);
    tokio::spawn(async move {
        locus_cli::shutdown_signal().await;
        tracing::info!("shutdown signal received");
        if let Err(e) = client.terminate().await {
            tracing::warn!(error = %e, "failed to stop center");
        }
    });

    center.join().await?;
    tracing::info!("locus-center exited cleanly");
    Ok(())
}
