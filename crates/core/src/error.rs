use locus_wire::WireError;
use thiserror::Error;

use crate::protocol::ServiceError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Failure of a typed call to a center or worker.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("remote error: {0}")]
    Remote(ServiceError),

    #[error("unexpected reply to {op}: {got}")]
    Protocol { op: &'static str, got: String },
}

impl RpcError {
    /// Whether the peer could not be reached, as opposed to answering with an error.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Wire(e) if e.is_connectivity())
    }
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Self::Wire(WireError::from(e))
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Self::Wire(WireError::from(e))
    }
}
