use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use locus_core::{Arg, Key, Status};
use locus_wire::{Address, Network};
use serde_json::Value;
use tokio::runtime::{Builder, Runtime};

use crate::error::PoolError;
use crate::future::{Computation, RemoteData, Resolve};
use crate::pool::Pool;

/// Thread-blocking front end to a [`Pool`].
///
/// Owns a current-thread runtime and drives the async pool to completion
/// for each call. Tasks dispatched by one call make progress during the
/// next blocking call, so poll with [`status`](Self::status) rather than
/// [`Computation::status`]. Must not be used from inside another runtime.
pub struct BlockingPool {
    runtime: Runtime,
    pool: Pool,
}

impl BlockingPool {
    pub fn new<A>(center: A, network: Arc<dyn Network>) -> Result<Self, PoolError>
    where
        A: TryInto<Address>,
        A::Error: fmt::Display,
    {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PoolError::Runtime(e.to_string()))?;
        Ok(Self {
            runtime,
            pool: Pool::new(center, network)?,
        })
    }

    /// The async pool behind this facade.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn sync(&self) -> Result<(), PoolError> {
        self.runtime.block_on(self.pool.sync())
    }

    pub fn submit(&self, function: &str, args: Vec<Arg>) -> Result<Computation, PoolError> {
        self.runtime.block_on(self.pool.submit(function, args))
    }

    pub fn map(&self, function: &str, batch: Vec<Vec<Arg>>) -> Result<Vec<Computation>, PoolError> {
        self.runtime.block_on(self.pool.map(function, batch))
    }

    pub fn gather<H: Resolve>(&self, handles: &[H]) -> Result<Vec<Value>, PoolError> {
        self.runtime.block_on(self.pool.gather(handles))
    }

    pub fn scatter(&self, values: Vec<Value>) -> Result<Vec<RemoteData>, PoolError> {
        self.runtime.block_on(self.pool.scatter(values))
    }

    /// Block until `computation` resolves and fetch its value.
    pub fn get(&self, computation: &Computation, delete_remote: bool) -> Result<Value, PoolError> {
        self.runtime.block_on(computation.get(delete_remote))
    }

    pub fn result(&self, computation: &Computation) -> Result<RemoteData, PoolError> {
        self.runtime.block_on(computation.result())
    }

    /// Let pending dispatches and replies run, then report `computation`'s
    /// status.
    pub fn status(&self, computation: &Computation) -> Status {
        self.runtime.block_on(tokio::task::yield_now());
        computation.status()
    }

    pub fn available_cores(&self) -> BTreeMap<Address, u32> {
        self.pool.available_cores()
    }

    pub fn ncores(&self) -> BTreeMap<Address, u32> {
        self.pool.ncores()
    }

    pub fn who_has(&self) -> HashMap<Key, BTreeSet<Address>> {
        self.pool.who_has()
    }

    pub fn close(&self) {
        self.runtime.block_on(self.pool.close())
    }
}
