//! The locus worker: runs named functions on a bounded number of slots,
//! keeps results in memory and serves them to pools and peer workers.

pub mod client;
pub mod error;
pub mod store;
pub mod worker;

pub use client::WorkerClient;
pub use error::WorkerError;
pub use worker::{Worker, WorkerConfig, WorkerHandle};
