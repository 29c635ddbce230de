//! Client side of a locus cluster: the locality-aware scheduler, the
//! handles it returns, and a blocking facade over it.

pub mod blocking;
pub mod error;
pub mod future;
pub mod locality;
pub mod pool;

pub use blocking::BlockingPool;
pub use error::PoolError;
pub use future::{Computation, RemoteData, Resolve, TaskState};
pub use locality::divide_tasks;
pub use pool::Pool;
