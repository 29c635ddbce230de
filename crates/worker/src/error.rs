use locus_core::RpcError;
use locus_wire::WireError;
use thiserror::Error;

/// Failures starting or stopping a worker. Request-level failures travel
/// back to the caller as service errors instead.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("invalid worker config: {0}")]
    Config(String),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("center unavailable: {0}")]
    Center(#[from] RpcError),

    #[error("worker task failed: {0}")]
    Join(String),
}
