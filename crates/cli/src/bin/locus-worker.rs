//! locus-worker: executes tasks and stores results for a locus cluster.
//!
//! # Usage
//!
//! ```bash
//! locus-worker --address 127.0.0.1:8788 --center 127.0.0.1:8787 --ncores 4
//!
//! # Via config file or environment
//! locus-worker --config locus.toml
//! LOCUS_WORKER_NCORES=4 locus-worker
//! ```
//!
//! On SIGINT/SIGTERM the worker deregisters, finishes in-flight requests
//! and exits.

use std::sync::Arc;

use clap::Parser;
use locus_core::FunctionRegistry;
use locus_wire::{Address, Network, ZmqNetwork};
use locus_worker::{Worker, WorkerClient, WorkerConfig};

/// Task executor and data holder for a locus cluster.
#[derive(Parser, Debug)]
#[command(name = "locus-worker", version, about)]
struct Cli {
    /// Path to a locus.toml config file.
    #[arg(long, env = "LOCUS_CONFIG")]
    config: Option<String>,

    /// Address to listen on (host:port). Overrides `[worker] address`.
    #[arg(long, env = "LOCUS_WORKER_ADDRESS")]
    address: Option<Address>,

    /// Center to register with (host:port). Overrides `[center] address`.
    #[arg(long, env = "LOCUS_CENTER_ADDRESS")]
    center: Option<Address>,

    /// Concurrent task slots (0 = one per CPU). Overrides `[worker] ncores`.
    #[arg(long, env = "LOCUS_WORKER_NCORES")]
    ncores: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    locus_cli::init_tracing();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting locus-worker");

    let mut config = locus_cli::load_config(cli.config.as_deref())?;
    if let Some(ncores) = cli.ncores {
        config.worker.ncores = ncores;
    }
    let worker_config = WorkerConfig {
        address: match cli.address {
            Some(address) => address,
            None => config.worker_address()?,
        },
        center: match cli.center {
            Some(center) => center,
            None => config.center_address()?,
        },
        ncores: config.resolved_ncores(),
    };

    let functions = FunctionRegistry::builtin();
    tracing::info!(functions = ?functions.names(), "loaded task functions");

    let network: Arc<dyn Network> = Arc::new(ZmqNetwork::new(config.request_timeout()));
    let address = worker_config.address.clone();
    let worker = Worker::start(Arc::clone(&network), worker_config, functions).await?;

    // Terminate through our own endpoint so a signal and a remote
    // terminate take the same path.
    let client = WorkerClient::new(network, address);
    tokio::spawn(async move {
        locus_cli::shutdown_signal().await;
        tracing::info!("shutdown signal received");
        if let Err(e) = client.terminate().await {
            tracing::warn!(error = %e, "failed to terminate worker");
        }
    });

    worker.join().await?;
    tracing::info!("locus-worker exited cleanly");
    Ok(())
}
