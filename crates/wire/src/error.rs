use thiserror::Error;

/// Errors that can occur in the messaging substrate.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("peer {0} is unreachable")]
    Unreachable(String),

    #[error("no reply from {address} after {after:?}")]
    Timeout {
        address: String,
        after: std::time::Duration,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("listener closed")]
    Closed,
}

impl WireError {
    /// Whether the error means the peer could not be reached at all, as
    /// opposed to a malformed exchange with a live peer.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Timeout { .. } | Self::Zmq(_) | Self::Closed
        )
    }
}
