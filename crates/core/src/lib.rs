//! Shared vocabulary of a locus cluster: keys, stored payloads, task
//! arguments, the request/reply protocol, named task functions and
//! configuration.

pub mod config;
pub mod data;
pub mod error;
pub mod function;
pub mod key;
pub mod protocol;

pub use config::{load_dotenv, LocusConfig};
pub use data::{Arg, Payload, RemoteRef, Status, TaskFailure};
pub use error::{CoreError, RpcError};
pub use function::{FunctionRegistry, TaskFn};
pub use key::Key;
pub use protocol::{
    call, decode_request, respond, CenterReply, CenterRequest, Rpc, ServiceError,
    ServiceErrorKind, WorkerReply, WorkerRequest,
};
