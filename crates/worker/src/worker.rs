use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use locus_center::CenterClient;
use locus_core::protocol::{decode_request, respond, ServiceError, WorkerReply, WorkerRequest};
use locus_core::{Arg, FunctionRegistry, Key, Payload, RemoteRef, TaskFailure};
use locus_wire::{serve, Address, Message, Network, Service, WireError};
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::client::WorkerClient;
use crate::error::WorkerError;
use crate::store::Store;

/// Where a worker listens, which center it reports to, and how many tasks
/// it runs at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub address: Address,
    pub center: Address,
    pub ncores: u32,
}

/// Executes named functions and keeps their results in a local store.
pub struct Worker {
    address: Address,
    ncores: u32,
    store: Store,
    slots: Semaphore,
    closing: AtomicBool,
    functions: Arc<FunctionRegistry>,
    network: Arc<dyn Network>,
    center: CenterClient,
    shutdown: Arc<Notify>,
}

impl Worker {
    /// Bind the worker's address, register with the center and start serving.
    #[instrument(skip_all, fields(address = %config.address, center = %config.center))]
    pub async fn start(
        network: Arc<dyn Network>,
        config: WorkerConfig,
        functions: FunctionRegistry,
    ) -> Result<WorkerHandle, WorkerError> {
        if config.ncores == 0 {
            return Err(WorkerError::Config("ncores must be at least 1".into()));
        }

        let listener = network.bind(&config.address).await?;
        let center = CenterClient::new(Arc::clone(&network), config.center.clone());
        center.register(&config.address, config.ncores).await?;

        let shutdown = Arc::new(Notify::new());
        let worker = Arc::new(Worker {
            address: config.address.clone(),
            ncores: config.ncores,
            store: Store::default(),
            slots: Semaphore::new(config.ncores as usize),
            closing: AtomicBool::new(false),
            functions: Arc::new(functions),
            network,
            center,
            shutdown: Arc::clone(&shutdown),
        });
        let task = tokio::spawn(serve(listener, Arc::clone(&worker), shutdown));
        info!(ncores = config.ncores, "worker started");

        Ok(WorkerHandle { worker, task })
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    async fn dispatch(&self, request: WorkerRequest) -> Result<WorkerReply, ServiceError> {
        match request {
            WorkerRequest::Compute {
                function,
                args,
                key,
            } => self.compute(function, args, key).await,
            WorkerRequest::Fetch { key, delete } => self.fetch(key, delete).await,
            WorkerRequest::Scatter { value, key } => self.scatter(value, key).await,
            WorkerRequest::Delete { key } => self.delete(key).await,
            WorkerRequest::Terminate => {
                self.terminate().await;
                Ok(WorkerReply::Ack)
            }
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    async fn compute(
        &self,
        function: String,
        args: Vec<Arg>,
        key: Option<Key>,
    ) -> Result<WorkerReply, ServiceError> {
        if self.is_closing() {
            return Err(ServiceError::closing(&self.address));
        }
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| ServiceError::closing(&self.address))?;

        let key = key.unwrap_or_else(|| Key::fresh(&function));
        debug!(%function, %key, "computing");
        let payload = match self.resolve_args(args).await {
            Ok(values) => self.execute(&function, values).await,
            Err(failure) => Payload::Failure(failure),
        };
        drop(permit);

        let status = payload.status();
        if let Payload::Failure(failure) = &payload {
            debug!(%function, %key, %failure, "task failed");
        }
        self.store.insert(key.clone(), payload);
        self.report_holds(vec![key.clone()]).await;
        Ok(WorkerReply::Computed { key, status })
    }

    async fn fetch(&self, key: Key, delete: bool) -> Result<WorkerReply, ServiceError> {
        let payload = if delete {
            self.store.remove(&key)
        } else {
            self.store.get(&key)
        };
        let payload = payload.ok_or_else(|| ServiceError::not_found(&key))?;
        if delete {
            self.report_drops(vec![key]).await;
        }
        Ok(WorkerReply::Data(payload))
    }

    async fn scatter(&self, value: Value, key: Option<Key>) -> Result<WorkerReply, ServiceError> {
        if self.is_closing() {
            return Err(ServiceError::closing(&self.address));
        }
        let key = key.unwrap_or_else(|| Key::fresh("data"));
        self.store.insert(key.clone(), Payload::Value(value));
        self.report_holds(vec![key.clone()]).await;
        Ok(WorkerReply::Scattered { key })
    }

    async fn delete(&self, key: Key) -> Result<WorkerReply, ServiceError> {
        if self.store.remove(&key).is_some() {
            self.report_drops(vec![key]).await;
        }
        Ok(WorkerReply::Ack)
    }

    /// Stop accepting new work, leave the cluster and stop the serve loop.
    /// Requests already in flight still complete.
    async fn terminate(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(address = %self.address, "terminating");
        if let Err(e) = self.center.deregister(&self.address).await {
            warn!(address = %self.address, error = %e, "deregister failed");
        }
        self.shutdown.notify_one();
    }

    // ── Compute helpers ─────────────────────────────────────────────

    async fn resolve_args(&self, args: Vec<Arg>) -> Result<Vec<Value>, TaskFailure> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = match arg {
                Arg::Value(v) => v,
                Arg::Remote(remote) => self.resolve_remote(&remote).await?.into_result()?,
            };
            values.push(value);
        }
        Ok(values)
    }

    /// Find a remote argument: the local store first, then the referenced
    /// holder, then whoever else the center says holds it. Fetched copies
    /// are not kept.
    async fn resolve_remote(&self, remote: &RemoteRef) -> Result<Payload, TaskFailure> {
        if let Some(payload) = self.store.get(&remote.key) {
            return Ok(payload);
        }
        if let Some(payload) = self.fetch_from(&remote.holder, &remote.key).await {
            return Ok(payload);
        }

        match self.center.who_has(Some(vec![remote.key.clone()])).await {
            Ok(mut who_has) => {
                let holders = who_has.remove(&remote.key).unwrap_or_default();
                for holder in holders.iter().filter(|h| **h != remote.holder) {
                    if let Some(payload) = self.fetch_from(holder, &remote.key).await {
                        return Ok(payload);
                    }
                }
            }
            Err(e) => debug!(key = %remote.key, error = %e, "center lookup failed"),
        }

        Err(TaskFailure::new(
            "LostData",
            format!("key {} is not held by any reachable worker", remote.key),
        ))
    }

    async fn fetch_from(&self, holder: &Address, key: &Key) -> Option<Payload> {
        if *holder == self.address {
            return None;
        }
        let peer = WorkerClient::new(Arc::clone(&self.network), holder.clone());
        match peer.fetch(key, false).await {
            Ok(payload) => {
                debug!(%key, %holder, "fetched from peer");
                Some(payload)
            }
            Err(e) => {
                debug!(%key, %holder, error = %e, "peer fetch failed");
                None
            }
        }
    }

    async fn execute(&self, function: &str, values: Vec<Value>) -> Payload {
        let Some(f) = self.functions.get(function) else {
            return Payload::Failure(TaskFailure::new(
                "UnknownFunction",
                format!("no function named '{function}'"),
            ));
        };
        match tokio::task::spawn_blocking(move || f(&values)).await {
            Ok(result) => Payload::from(result),
            Err(e) if e.is_panic() => Payload::Failure(TaskFailure::new(
                "Panic",
                panic_message(e.into_panic()),
            )),
            Err(e) => Payload::Failure(TaskFailure::new("Cancelled", e.to_string())),
        }
    }

    // ── Center reports ──────────────────────────────────────────────

    async fn report_holds(&self, keys: Vec<Key>) {
        if let Err(e) = self.center.add_keys(&self.address, keys).await {
            warn!(address = %self.address, error = %e, "failed to report held keys");
        }
    }

    async fn report_drops(&self, keys: Vec<Key>) {
        if let Err(e) = self.center.remove_keys(&self.address, keys).await {
            warn!(address = %self.address, error = %e, "failed to report dropped keys");
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[async_trait]
impl Service for Worker {
    async fn handle(&self, request: Message) -> Result<Message, WireError> {
        let decoded = match decode_request::<WorkerRequest>(&request) {
            Ok(r) => r,
            Err(reply) => return Ok(reply),
        };
        let reply = self.dispatch(decoded).await;
        respond(&request, &reply)
    }
}

/// Handle to a running [`Worker`].
pub struct WorkerHandle {
    worker: Arc<Worker>,
    task: JoinHandle<Result<(), WireError>>,
}

impl WorkerHandle {
    pub fn address(&self) -> &Address {
        &self.worker.address
    }

    pub fn ncores(&self) -> u32 {
        self.worker.ncores
    }

    /// Number of keys in the local store.
    pub fn data_len(&self) -> usize {
        self.worker.store.len()
    }

    pub fn has_key(&self, key: &Key) -> bool {
        self.worker.store.contains(key)
    }

    /// Terminate the worker: refuse new work, deregister and stop serving.
    pub async fn close(&self) {
        self.worker.terminate().await;
    }

    /// Wait until the serve loop has drained and the endpoint is closed.
    pub async fn join(self) -> Result<(), WorkerError> {
        self.task
            .await
            .map_err(|e| WorkerError::Join(e.to_string()))??;
        Ok(())
    }
}
