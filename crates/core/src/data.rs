//! Values as they are stored on workers and referenced by clients.

use std::fmt;

use locus_wire::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::Key;

/// Life cycle of a computation. Remote references only ever carry
/// `Success` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Running,
    Success,
    Error,
}

impl Status {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A failure raised by a task function, captured where it happened.
///
/// `kind` classifies the failure (`"DivisionByZero"`, `"TypeError"`, ...) and
/// survives every hop back to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: String,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TaskFailure {}

/// What a worker keeps under a key: a value, or the failure that took its place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Value(Value),
    Failure(TaskFailure),
}

impl Payload {
    pub fn status(&self) -> Status {
        match self {
            Self::Value(_) => Status::Success,
            Self::Failure(_) => Status::Error,
        }
    }

    pub fn into_result(self) -> Result<Value, TaskFailure> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Failure(f) => Err(f),
        }
    }
}

impl From<Result<Value, TaskFailure>> for Payload {
    fn from(result: Result<Value, TaskFailure>) -> Self {
        match result {
            Ok(v) => Self::Value(v),
            Err(f) => Self::Failure(f),
        }
    }
}

/// Handle to a value that lives on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteRef {
    pub key: Key,
    /// Best known holder. May be stale.
    pub holder: Address,
    pub status: Status,
}

/// A positional task argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Value(Value),
    /// Resolved by the executing worker, from its own store or its holder.
    Remote(RemoteRef),
}

impl Arg {
    pub fn value(v: impl Into<Value>) -> Self {
        Self::Value(v.into())
    }

    pub fn remote_key(&self) -> Option<&Key> {
        match self {
            Self::Remote(r) => Some(&r.key),
            Self::Value(_) => None,
        }
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Self::Value(v)
    }
}

impl From<RemoteRef> for Arg {
    fn from(r: RemoteRef) -> Self {
        Self::Remote(r)
    }
}

impl From<&RemoteRef> for Arg {
    fn from(r: &RemoteRef) -> Self {
        Self::Remote(r.clone())
    }
}
