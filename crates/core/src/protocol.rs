//! Request/reply vocabulary spoken between pools, workers and the center.
//!
//! Every request enum implements [`Rpc`], tying it to its reply enum. On the
//! wire a reply payload is always `Result<Reply, ServiceError>`, so domain
//! errors travel as data and the substrate only ever reports delivery failures.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use locus_wire::{Address, Message, Network, WireError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::data::{Arg, Payload, Status};
use crate::error::RpcError;
use crate::key::Key;

// ─── Errors carried in replies ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceErrorKind {
    /// The key is not in the worker's local store.
    NotFound,
    /// The worker is terminating and accepts no new work.
    Closing,
    /// The request could not be decoded or makes no sense to this peer.
    BadRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn not_found(key: &Key) -> Self {
        Self {
            kind: ServiceErrorKind::NotFound,
            message: format!("key {key} not found"),
        }
    }

    pub fn closing(address: &Address) -> Self {
        Self {
            kind: ServiceErrorKind::Closing,
            message: format!("worker {address} is terminating"),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::BadRequest,
            message: message.into(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ServiceError {}

// ─── Center ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CenterRequest {
    Register { address: Address, ncores: u32 },
    Deregister { address: Address },
    /// `address` now holds `keys`.
    AddKeys { address: Address, keys: Vec<Key> },
    /// `address` no longer holds `keys`.
    RemoveKeys { address: Address, keys: Vec<Key> },
    /// Holders of `keys`, or of every known key when `None`.
    WhoHas { keys: Option<Vec<Key>> },
    HasWhat { address: Address },
    Ncores,
    /// Stop the center.
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CenterReply {
    Ack,
    WhoHas(HashMap<Key, BTreeSet<Address>>),
    HasWhat(BTreeSet<Key>),
    Ncores(BTreeMap<Address, u32>),
}

// ─── Worker ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerRequest {
    Compute {
        function: String,
        args: Vec<Arg>,
        /// Result key chosen by the caller; the worker picks one when absent.
        key: Option<Key>,
    },
    Fetch { key: Key, delete: bool },
    Scatter { value: Value, key: Option<Key> },
    Delete { key: Key },
    Terminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkerReply {
    Computed { key: Key, status: Status },
    Data(Payload),
    Scattered { key: Key },
    Ack,
}

// ─── Typed calls ───────────────────────────────────────────────────────────

/// A request with a known reply type.
pub trait Rpc: Serialize {
    type Reply: Serialize + DeserializeOwned;

    /// Operation name used on the envelope.
    fn op(&self) -> &'static str;

    /// Whether the reply waits on open-ended work at the peer. Such calls
    /// have no reply deadline and fail only when the peer is gone.
    fn is_open_ended(&self) -> bool {
        false
    }
}

impl Rpc for CenterRequest {
    type Reply = CenterReply;

    fn op(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Deregister { .. } => "deregister",
            Self::AddKeys { .. } => "add_keys",
            Self::RemoveKeys { .. } => "remove_keys",
            Self::WhoHas { .. } => "who_has",
            Self::HasWhat { .. } => "has_what",
            Self::Ncores => "ncores",
            Self::Terminate => "terminate",
        }
    }
}

impl Rpc for WorkerRequest {
    type Reply = WorkerReply;

    fn op(&self) -> &'static str {
        match self {
            Self::Compute { .. } => "compute",
            Self::Fetch { .. } => "fetch",
            Self::Scatter { .. } => "scatter",
            Self::Delete { .. } => "delete",
            Self::Terminate => "terminate",
        }
    }

    fn is_open_ended(&self) -> bool {
        matches!(self, Self::Compute { .. })
    }
}

/// Send `request` to `to` and decode its reply.
pub async fn call<R: Rpc>(
    network: &dyn Network,
    to: &Address,
    request: &R,
) -> Result<R::Reply, RpcError> {
    let message = Message::new(request.op(), request)?;
    let reply = if request.is_open_ended() {
        network.request_supervised(to, message).await?
    } else {
        network.request(to, message).await?
    };
    let decoded: Result<R::Reply, ServiceError> = reply.decode()?;
    decoded.map_err(RpcError::Remote)
}

/// Decode a request on the service side. A payload that does not decode is
/// answered with a `BadRequest` reply instead of being dropped.
pub fn decode_request<R: Rpc + DeserializeOwned>(message: &Message) -> Result<R, Message> {
    match message.decode::<R>() {
        Ok(request) => Ok(request),
        Err(e) => {
            debug!(op = %message.op, error = %e, "undecodable request");
            let err: Result<R::Reply, ServiceError> =
                Err(ServiceError::bad_request(format!("cannot decode {}: {e}", message.op)));
            // Echo the request back if even the error cannot be encoded.
            Err(message.reply(&err).unwrap_or_else(|_| message.clone()))
        }
    }
}

/// Encode the reply to `request`.
pub fn respond<T: Serialize>(
    request: &Message,
    result: &Result<T, ServiceError>,
) -> Result<Message, WireError> {
    Ok(request.reply(result)?)
}
