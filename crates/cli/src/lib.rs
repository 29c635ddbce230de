//! Process bootstrapping shared by the `locus-center` and `locus-worker`
//! binaries.

use locus_core::{load_dotenv, CoreError, LocusConfig};

/// Load `.env`, then the config file if one is given, else defaults.
/// `LOCUS_*` environment variables override either.
pub fn load_config(path: Option<&str>) -> Result<LocusConfig, CoreError> {
    load_dotenv();
    match path {
        Some(path) => LocusConfig::from_file(path),
        None => LocusConfig::from_env(),
    }
}

/// Initialize structured logging from `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Wait for SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for ctrl_c");
    }
}
