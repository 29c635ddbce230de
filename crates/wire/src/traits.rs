use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::address::Address;
use crate::error::WireError;
use crate::message::Message;

/// Opaque handle that routes a reply back to whoever sent the request.
///
/// A listener hands one out with every received request; it must be passed
/// back to [`Listener::send_reply`] exactly once.
#[derive(Debug)]
pub struct ReplyToken {
    pub(crate) route: Route,
}

#[derive(Debug)]
pub(crate) enum Route {
    /// ZeroMQ ROUTER peer identity frame.
    Zmq { identity: Vec<u8> },
    /// In-process reply slot.
    Local(oneshot::Sender<Message>),
}

/// The addressed request/reply substrate that centers, workers and pools
/// talk over.
///
/// Implementations report an unreachable peer as an error from
/// [`request`](Network::request) rather than blocking forever.
#[async_trait]
pub trait Network: Send + Sync {
    /// Send a request to `to` and wait for its reply.
    async fn request(&self, to: &Address, message: Message) -> Result<Message, WireError>;

    /// Send a request whose reply may take arbitrarily long, such as one
    /// that runs work on the peer. No reply deadline applies; the request
    /// fails only once the peer stops being reachable.
    ///
    /// The default suits transports that already report a vanished peer
    /// without a deadline.
    async fn request_supervised(
        &self,
        to: &Address,
        message: Message,
    ) -> Result<Message, WireError> {
        self.request(to, message).await
    }

    /// Start listening on `at`.
    async fn bind(&self, at: &Address) -> Result<Box<dyn Listener>, WireError>;

    /// Drop any cached connection to `to`.
    async fn forget(&self, to: &Address);
}

#[async_trait]
impl<T: Network + ?Sized> Network for Arc<T> {
    async fn request(&self, to: &Address, message: Message) -> Result<Message, WireError> {
        (**self).request(to, message).await
    }

    async fn request_supervised(
        &self,
        to: &Address,
        message: Message,
    ) -> Result<Message, WireError> {
        (**self).request_supervised(to, message).await
    }

    async fn bind(&self, at: &Address) -> Result<Box<dyn Listener>, WireError> {
        (**self).bind(at).await
    }

    async fn forget(&self, to: &Address) {
        (**self).forget(to).await
    }
}

/// The receiving end of a bound address.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Receive the next request. Cancel-safe.
    async fn recv_request(&self) -> Result<(ReplyToken, Message), WireError>;

    /// Send the reply for a previously received request.
    async fn send_reply(&self, token: ReplyToken, reply: Message) -> Result<(), WireError>;

    /// The address this listener is bound to.
    fn address(&self) -> &Address;
}

/// Request handler run by [`serve`](crate::serve::serve).
///
/// Domain failures belong in the reply payload. An `Err` here means no reply
/// could be produced at all; the request is dropped and the peer sees a
/// connectivity failure.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    async fn handle(&self, request: Message) -> Result<Message, WireError>;
}
