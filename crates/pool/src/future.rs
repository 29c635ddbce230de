//! Client-side handles: [`Computation`] for a submitted task and
//! [`RemoteData`] for a value living on a worker.

use async_trait::async_trait;
use locus_core::{Arg, Key, RemoteRef, Status};
use locus_wire::Address;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::PoolError;
use crate::pool::Pool;

/// Where a submitted task is in its life cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    /// Queued until a worker has a free core.
    Pending,
    Running { worker: Address },
    /// The worker replied; the result (value or failure) is stored there.
    Finished(RemoteRef),
    /// The task never produced a stored result.
    Failed(PoolError),
}

impl TaskState {
    pub fn status(&self) -> Status {
        match self {
            Self::Pending => Status::Pending,
            Self::Running { .. } => Status::Running,
            Self::Finished(remote) => remote.status,
            Self::Failed(_) => Status::Error,
        }
    }
}

/// Handle to a submitted task. Clones observe the same transitions.
///
/// Dropping every handle does not cancel the remote execution.
#[derive(Clone)]
pub struct Computation {
    state: watch::Receiver<TaskState>,
    pool: Pool,
}

impl Computation {
    pub(crate) fn new(state: watch::Receiver<TaskState>, pool: Pool) -> Self {
        Self { state, pool }
    }

    pub fn status(&self) -> Status {
        self.state.borrow().status()
    }

    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// The worker running or holding this task, once known.
    pub fn worker(&self) -> Option<Address> {
        match &*self.state.borrow() {
            TaskState::Running { worker } => Some(worker.clone()),
            TaskState::Finished(remote) => Some(remote.holder.clone()),
            TaskState::Pending | TaskState::Failed(_) => None,
        }
    }

    /// Wait for the worker's reply. A task whose function failed still
    /// resolves here, to a reference with status `Error`; the failure is
    /// raised when the value is fetched.
    pub async fn result(&self) -> Result<RemoteData, PoolError> {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                TaskState::Finished(remote) => {
                    return Ok(RemoteData::new(remote, self.pool.clone()));
                }
                TaskState::Failed(e) => return Err(e),
                TaskState::Pending | TaskState::Running { .. } => {}
            }
            state.changed().await.map_err(|_| PoolError::Closed)?;
        }
    }

    /// Wait for the result and fetch its value.
    pub async fn get(&self, delete_remote: bool) -> Result<Value, PoolError> {
        self.result().await?.get(delete_remote).await
    }
}

impl std::fmt::Debug for Computation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computation")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// A value stored on a worker, as seen from the client.
#[derive(Clone)]
pub struct RemoteData {
    reference: RemoteRef,
    pool: Pool,
}

impl RemoteData {
    pub(crate) fn new(reference: RemoteRef, pool: Pool) -> Self {
        Self { reference, pool }
    }

    pub fn key(&self) -> &Key {
        &self.reference.key
    }

    pub fn holder(&self) -> &Address {
        &self.reference.holder
    }

    pub fn status(&self) -> Status {
        self.reference.status
    }

    pub fn reference(&self) -> &RemoteRef {
        &self.reference
    }

    /// Fetch the value. A stored failure is raised as
    /// [`PoolError::Execution`]; `delete_remote` drops the worker's copy.
    pub async fn get(&self, delete_remote: bool) -> Result<Value, PoolError> {
        self.pool.fetch(&self.reference, delete_remote).await
    }
}

impl std::fmt::Debug for RemoteData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RemoteData").field(&self.reference).finish()
    }
}

impl From<&RemoteData> for Arg {
    fn from(data: &RemoteData) -> Self {
        Arg::Remote(data.reference.clone())
    }
}

impl From<RemoteData> for Arg {
    fn from(data: RemoteData) -> Self {
        Arg::Remote(data.reference)
    }
}

/// Anything that eventually names a stored value.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self) -> Result<RemoteData, PoolError>;
}

#[async_trait]
impl Resolve for Computation {
    async fn resolve(&self) -> Result<RemoteData, PoolError> {
        self.result().await
    }
}

#[async_trait]
impl Resolve for RemoteData {
    async fn resolve(&self) -> Result<RemoteData, PoolError> {
        Ok(self.clone())
    }
}
