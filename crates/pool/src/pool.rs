use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{try_join_all, BoxFuture};
use locus_center::CenterClient;
use locus_core::protocol::ServiceErrorKind;
use locus_core::{Arg, Key, RemoteRef, RpcError, Status};
use locus_wire::{Address, Network, WireError};
use locus_worker::WorkerClient;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::PoolError;
use crate::future::{Computation, RemoteData, Resolve, TaskState};
use crate::locality::divide_tasks;

/// Client-side scheduler.
///
/// Keeps advisory copies of the center's core counts and key locations,
/// counts the tasks it has running on each worker, and dispatches work with
/// a preference for workers that already hold a task's inputs. Cheap to
/// clone; clones share one scheduler.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    center: CenterClient,
    network: Arc<dyn Network>,
    state: Mutex<PoolState>,
}

struct QueuedTask {
    id: u64,
    function: String,
    args: Vec<Arg>,
    needed: BTreeSet<Key>,
    state: watch::Sender<TaskState>,
}

#[derive(Default)]
struct PoolState {
    ncores: BTreeMap<Address, u32>,
    running: BTreeMap<Address, u32>,
    who_has: HashMap<Key, BTreeSet<Address>>,
    queue: VecDeque<QueuedTask>,
    next_id: u64,
    scatter_cursor: usize,
    synced: bool,
    closed: bool,
}

type Dispatch = Vec<(Address, QueuedTask)>;

impl PoolState {
    fn free(&self, worker: &Address) -> u32 {
        let cores = self.ncores.get(worker).copied().unwrap_or(0);
        let running = self.running.get(worker).copied().unwrap_or(0);
        cores.saturating_sub(running)
    }

    fn available(&self) -> BTreeMap<Address, u32> {
        self.ncores
            .keys()
            .map(|w| (w.clone(), self.free(w)))
            .collect()
    }

    fn claim(&mut self, worker: &Address) {
        *self.running.entry(worker.clone()).or_default() += 1;
    }

    fn release(&mut self, worker: &Address) {
        if let Some(n) = self.running.get_mut(worker) {
            *n = n.saturating_sub(1);
        }
    }

    /// Drop a worker from every cache. Fails the queue if nobody is left.
    fn drop_worker(&mut self, worker: &Address) {
        self.ncores.remove(worker);
        self.running.remove(worker);
        self.who_has.retain(|_, holders| {
            holders.remove(worker);
            !holders.is_empty()
        });
        if self.ncores.is_empty() {
            for task in self.queue.drain(..) {
                task.state.send_replace(TaskState::Failed(PoolError::NoWorkers));
            }
        }
    }

    fn forget_copy(&mut self, key: &Key, holder: &Address) {
        if let Some(holders) = self.who_has.get_mut(key) {
            holders.remove(holder);
            if holders.is_empty() {
                self.who_has.remove(key);
            }
        }
    }

    /// Assign as much of the queue as free cores allow and mark those tasks
    /// running.
    ///
    /// Locality first: workers take turns claiming the next unclaimed task
    /// from their share list. Whatever is left goes, in queue order, to the
    /// worker with the most free cores. The rest stays queued.
    fn plan(&mut self) -> Dispatch {
        if self.queue.is_empty() || self.ncores.is_empty() {
            return Vec::new();
        }
        let mut free = self.available();
        let needed: BTreeMap<u64, BTreeSet<Key>> = self
            .queue
            .iter()
            .map(|t| (t.id, t.needed.clone()))
            .collect();
        let (shares, _extra) = divide_tasks(&self.who_has, &needed);

        let mut assigned: BTreeMap<u64, Address> = BTreeMap::new();
        let mut cursors: BTreeMap<&Address, usize> = BTreeMap::new();
        loop {
            let mut progress = false;
            for (worker, share) in &shares {
                let Some(slots) = free.get_mut(worker).filter(|n| **n > 0) else {
                    continue;
                };
                let cursor = cursors.entry(worker).or_default();
                while let Some(task) = share.get(*cursor) {
                    *cursor += 1;
                    if !assigned.contains_key(task) {
                        assigned.insert(*task, worker.clone());
                        *slots -= 1;
                        progress = true;
                        break;
                    }
                }
            }
            if !progress {
                break;
            }
        }

        for task in &self.queue {
            if assigned.contains_key(&task.id) {
                continue;
            }
            // Most free cores first, lowest address on ties.
            let best = free
                .iter()
                .filter(|(_, n)| **n > 0)
                .max_by(|(wa, na), (wb, nb)| na.cmp(nb).then_with(|| wb.cmp(wa)))
                .map(|(w, _)| w.clone());
            let Some(worker) = best else {
                break;
            };
            if let Some(n) = free.get_mut(&worker) {
                *n -= 1;
            }
            assigned.insert(task.id, worker);
        }

        if assigned.is_empty() {
            return Vec::new();
        }
        let mut dispatch = Vec::with_capacity(assigned.len());
        let mut waiting = VecDeque::with_capacity(self.queue.len());
        for task in self.queue.drain(..) {
            match assigned.remove(&task.id) {
                Some(worker) => dispatch.push((worker, task)),
                None => waiting.push_back(task),
            }
        }
        self.queue = waiting;
        for (worker, task) in &dispatch {
            self.claim(worker);
            task.state.send_replace(TaskState::Running {
                worker: worker.clone(),
            });
        }
        dispatch
    }
}

impl Pool {
    /// A pool talking to the center at `center` (an [`Address`],
    /// `"host:port"` or `(host, port)`).
    pub fn new<A>(center: A, network: Arc<dyn Network>) -> Result<Self, PoolError>
    where
        A: TryInto<Address>,
        A::Error: fmt::Display,
    {
        let center = center
            .try_into()
            .map_err(|e| PoolError::Runtime(format!("invalid center address: {e}")))?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                center: CenterClient::new(Arc::clone(&network), center),
                network,
                state: Mutex::new(PoolState::default()),
            }),
        })
    }

    pub fn center(&self) -> &Address {
        self.inner.center.address()
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.inner.state()
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Free cores per known worker.
    pub fn available_cores(&self) -> BTreeMap<Address, u32> {
        self.state().available()
    }

    pub fn ncores(&self) -> BTreeMap<Address, u32> {
        self.state().ncores.clone()
    }

    pub fn who_has(&self) -> HashMap<Key, BTreeSet<Address>> {
        self.state().who_has.clone()
    }

    /// Tasks waiting for a free core.
    pub fn queued(&self) -> usize {
        self.state().queue.len()
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Re-read core counts and key locations from the center.
    ///
    /// Workers the center no longer knows are dropped; tasks already
    /// running on known workers keep their cores counted.
    #[instrument(skip_all, fields(center = %self.center()))]
    pub async fn sync(&self) -> Result<(), PoolError> {
        let ncores = self
            .inner
            .center
            .ncores()
            .await
            .map_err(PoolError::from_center)?;
        let who_has = self
            .inner
            .center
            .who_has(None)
            .await
            .map_err(PoolError::from_center)?;

        let dispatch = {
            let mut state = self.state();
            if state.closed {
                return Err(PoolError::Closed);
            }
            state.running.retain(|w, _| ncores.contains_key(w));
            state.ncores = ncores;
            state.who_has = who_has;
            state.synced = true;
            debug!(workers = state.ncores.len(), keys = state.who_has.len(), "synced");
            state.plan()
        };
        self.inner.launch(dispatch);
        Ok(())
    }

    async fn ensure_synced(&self) -> Result<(), PoolError> {
        let synced = {
            let state = self.state();
            if state.closed {
                return Err(PoolError::Closed);
            }
            state.synced
        };
        if !synced {
            self.sync().await?;
        }
        Ok(())
    }

    /// Submit one task. The returned computation is `Running` if a core was
    /// free and `Pending` otherwise.
    pub async fn submit(&self, function: &str, args: Vec<Arg>) -> Result<Computation, PoolError> {
        self.map(function, vec![args])
            .await?
            .pop()
            .ok_or_else(|| PoolError::Runtime("submit produced no computation".into()))
    }

    /// Submit one task per argument list, planned together so that locality
    /// is decided over the whole batch.
    #[instrument(skip(self, batch), fields(tasks = batch.len()))]
    pub async fn map(
        &self,
        function: &str,
        batch: Vec<Vec<Arg>>,
    ) -> Result<Vec<Computation>, PoolError> {
        self.ensure_synced().await?;

        let (computations, dispatch) = {
            let mut state = self.state();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if state.ncores.is_empty() {
                return Err(PoolError::NoWorkers);
            }
            let mut computations = Vec::with_capacity(batch.len());
            for args in batch {
                let needed: BTreeSet<Key> =
                    args.iter().filter_map(Arg::remote_key).cloned().collect();
                // A reference's holder is a hint until the center says otherwise.
                for arg in &args {
                    if let Arg::Remote(remote) = arg {
                        state
                            .who_has
                            .entry(remote.key.clone())
                            .or_insert_with(|| BTreeSet::from([remote.holder.clone()]));
                    }
                }
                let (tx, rx) = watch::channel(TaskState::Pending);
                let id = state.next_id;
                state.next_id += 1;
                state.queue.push_back(QueuedTask {
                    id,
                    function: function.to_string(),
                    args,
                    needed,
                    state: tx,
                });
                computations.push(Computation::new(rx, self.clone()));
            }
            (computations, state.plan())
        };

        debug!(dispatched = dispatch.len(), "planned batch");
        self.inner.launch(dispatch);
        Ok(computations)
    }

    /// Resolve every handle and fetch its value, in input order. Fails with
    /// the first error.
    pub async fn gather<H: Resolve>(&self, handles: &[H]) -> Result<Vec<Value>, PoolError> {
        try_join_all(
            handles
                .iter()
                .map(|h| async move { h.resolve().await?.get(false).await }),
        )
        .await
    }

    /// Store `values` on the known workers, round-robin.
    #[instrument(skip_all, fields(values = values.len()))]
    pub async fn scatter(&self, values: Vec<Value>) -> Result<Vec<RemoteData>, PoolError> {
        self.ensure_synced().await?;

        let targets: Vec<Address> = {
            let mut state = self.state();
            let workers: Vec<Address> = state.ncores.keys().cloned().collect();
            if workers.is_empty() {
                return Err(PoolError::NoWorkers);
            }
            let start = state.scatter_cursor;
            state.scatter_cursor = (start + values.len()) % workers.len();
            (0..values.len())
                .map(|i| workers[(start + i) % workers.len()].clone())
                .collect()
        };

        let stores = values.into_iter().zip(targets).map(|(value, worker)| async move {
            let client = WorkerClient::new(Arc::clone(&self.inner.network), worker.clone());
            let key = client
                .scatter(value, None)
                .await
                .map_err(|e| PoolError::from_worker(&worker, e))?;
            self.state()
                .who_has
                .entry(key.clone())
                .or_default()
                .insert(worker.clone());
            Ok::<_, PoolError>(RemoteData::new(
                RemoteRef {
                    key,
                    holder: worker,
                    status: Status::Success,
                },
                self.clone(),
            ))
        });
        try_join_all(stores).await
    }

    /// Fetch a stored value from its holder.
    pub(crate) async fn fetch(&self, remote: &RemoteRef, delete: bool) -> Result<Value, PoolError> {
        let client = WorkerClient::new(Arc::clone(&self.inner.network), remote.holder.clone());
        let lost = || PoolError::Lost {
            key: remote.key.clone(),
            holder: remote.holder.clone(),
        };
        match client.fetch(&remote.key, delete).await {
            Ok(payload) => {
                if delete {
                    self.state().forget_copy(&remote.key, &remote.holder);
                }
                payload.into_result().map_err(PoolError::from)
            }
            Err(RpcError::Remote(e)) if e.kind == ServiceErrorKind::NotFound => {
                self.state().forget_copy(&remote.key, &remote.holder);
                Err(lost())
            }
            Err(e) if e.is_connectivity() => {
                debug!(key = %remote.key, holder = %remote.holder, error = %e, "holder unreachable");
                Err(lost())
            }
            Err(e) => Err(PoolError::from_worker(&remote.holder, e)),
        }
    }

    /// Drop caches and cached connections and fail queued tasks. Tasks
    /// already running finish normally; workers are left alone.
    pub async fn close(&self) {
        let (queued, workers) = {
            let mut state = self.state();
            state.closed = true;
            let queued: Vec<QueuedTask> = state.queue.drain(..).collect();
            let workers: Vec<Address> = state.ncores.keys().cloned().collect();
            state.ncores.clear();
            state.running.clear();
            state.who_has.clear();
            (queued, workers)
        };
        for task in queued {
            task.state.send_replace(TaskState::Failed(PoolError::Closed));
        }
        for worker in &workers {
            self.inner.network.forget(worker).await;
        }
        self.inner.network.forget(self.center()).await;
        info!(center = %self.center(), "pool closed");
    }
}

impl PoolInner {
    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn launch(self: &Arc<Self>, dispatch: Dispatch) {
        for (worker, task) in dispatch {
            tokio::spawn(run_task(Arc::clone(self), worker, task));
        }
    }
}

/// Send one task to its worker, record the outcome and launch whatever
/// the freed core allows.
fn run_task(inner: Arc<PoolInner>, worker: Address, task: QueuedTask) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let client = WorkerClient::new(Arc::clone(&inner.network), worker.clone());
        let outcome = client.compute(&task.function, task.args, None).await;
        let gone = matches!(&outcome, Err(e) if worker_gone(e));

        let dispatch = {
            let mut state = inner.state();
            state.release(&worker);
            match outcome {
                Ok((key, status)) => {
                    if !state.closed {
                        state
                            .who_has
                            .entry(key.clone())
                            .or_default()
                            .insert(worker.clone());
                    }
                    task.state.send_replace(TaskState::Finished(RemoteRef {
                        key,
                        holder: worker.clone(),
                        status,
                    }));
                }
                Err(e) => {
                    warn!(%worker, function = %task.function, error = %e, "dispatch failed");
                    if gone {
                        state.drop_worker(&worker);
                    }
                    task.state
                        .send_replace(TaskState::Failed(PoolError::from_worker(&worker, e)));
                }
            }
            state.plan()
        };

        if gone {
            inner.network.forget(&worker).await;
        }
        inner.launch(dispatch);
    })
}

/// The worker cannot take work any more: unreachable, or terminating.
/// A timeout alone only says the reply was slow, not that the worker died.
fn worker_gone(err: &RpcError) -> bool {
    match err {
        RpcError::Wire(WireError::Timeout { .. }) => false,
        RpcError::Remote(e) => e.kind == ServiceErrorKind::Closing,
        other => other.is_connectivity(),
    }
}
