use std::sync::Arc;

use locus_core::protocol::{call, WorkerReply, WorkerRequest};
use locus_core::{Arg, Key, Payload, RpcError, Status};
use locus_wire::{Address, Network};
use serde_json::Value;

/// Typed client for one worker. Cheap to build; connections are cached by
/// the network.
#[derive(Clone)]
pub struct WorkerClient {
    network: Arc<dyn Network>,
    worker: Address,
}

impl WorkerClient {
    pub fn new(network: Arc<dyn Network>, worker: Address) -> Self {
        Self { network, worker }
    }

    pub fn address(&self) -> &Address {
        &self.worker
    }

    /// Run `function` on the worker and return where its result was stored.
    pub async fn compute(
        &self,
        function: &str,
        args: Vec<Arg>,
        key: Option<Key>,
    ) -> Result<(Key, Status), RpcError> {
        let request = WorkerRequest::Compute {
            function: function.to_string(),
            args,
            key,
        };
        match self.call(&request).await? {
            WorkerReply::Computed { key, status } => Ok((key, status)),
            other => Err(unexpected("compute", &other)),
        }
    }

    /// Read a stored payload, optionally dropping the worker's copy.
    pub async fn fetch(&self, key: &Key, delete: bool) -> Result<Payload, RpcError> {
        let request = WorkerRequest::Fetch {
            key: key.clone(),
            delete,
        };
        match self.call(&request).await? {
            WorkerReply::Data(payload) => Ok(payload),
            other => Err(unexpected("fetch", &other)),
        }
    }

    pub async fn scatter(&self, value: Value, key: Option<Key>) -> Result<Key, RpcError> {
        match self.call(&WorkerRequest::Scatter { value, key }).await? {
            WorkerReply::Scattered { key } => Ok(key),
            other => Err(unexpected("scatter", &other)),
        }
    }

    pub async fn delete(&self, key: &Key) -> Result<(), RpcError> {
        let request = WorkerRequest::Delete { key: key.clone() };
        match self.call(&request).await? {
            WorkerReply::Ack => Ok(()),
            other => Err(unexpected("delete", &other)),
        }
    }

    pub async fn terminate(&self) -> Result<(), RpcError> {
        match self.call(&WorkerRequest::Terminate).await? {
            WorkerReply::Ack => Ok(()),
            other => Err(unexpected("terminate", &other)),
        }
    }

    async fn call(&self, request: &WorkerRequest) -> Result<WorkerReply, RpcError> {
        call(self.network.as_ref(), &self.worker, request).await
    }
}

fn unexpected(op: &'static str, reply: &WorkerReply) -> RpcError {
    RpcError::Protocol {
        op,
        got: format!("{reply:?}"),
    }
}
