//! Addressed request/reply messaging for locus centers, workers and pools.

pub mod address;
pub mod error;
pub mod local;
pub mod message;
pub mod reqrep;
pub mod serve;
pub mod traits;
pub mod zmq;

pub use address::Address;
pub use error::WireError;
pub use local::LocalNetwork;
pub use message::Message;
pub use reqrep::{ZmqRequestClient, ZmqRequestServer};
pub use serve::serve;
pub use traits::{Listener, Network, ReplyToken, Service};
pub use zmq::ZmqNetwork;
