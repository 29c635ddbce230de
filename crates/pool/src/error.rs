use locus_core::protocol::ServiceErrorKind;
use locus_core::{Key, RpcError, TaskFailure};
use locus_wire::Address;
use thiserror::Error;

/// Errors seen by pool users.
///
/// `Clone` so that every holder of a [`Computation`](crate::Computation)
/// observes the same failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The task ran and failed. `kind` is the classification captured on the
    /// worker (`"DivisionByZero"`, `"TypeError"`, ...).
    #[error("{kind}: {message}")]
    Execution { kind: String, message: String },

    /// The holder no longer has the key, or is gone.
    #[error("key {key} lost: not available from {holder}")]
    Lost { key: Key, holder: Address },

    #[error("worker {address} unreachable: {reason}")]
    Unreachable { address: Address, reason: String },

    #[error("no workers registered with the center")]
    NoWorkers,

    #[error("pool is closed")]
    Closed,

    #[error("center error: {0}")]
    Center(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl PoolError {
    /// Failure classification for execution errors.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Execution { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub(crate) fn from_worker(address: &Address, err: RpcError) -> Self {
        if err.is_connectivity() {
            return Self::Unreachable {
                address: address.clone(),
                reason: err.to_string(),
            };
        }
        match err {
            RpcError::Remote(e) if e.kind == ServiceErrorKind::Closing => Self::Unreachable {
                address: address.clone(),
                reason: e.message,
            },
            other => Self::Remote(other.to_string()),
        }
    }

    pub(crate) fn from_center(err: RpcError) -> Self {
        Self::Center(err.to_string())
    }
}

impl From<TaskFailure> for PoolError {
    fn from(failure: TaskFailure) -> Self {
        Self::Execution {
            kind: failure.kind,
            message: failure.message,
        }
    }
}
