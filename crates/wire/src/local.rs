//! In-process [`Network`] built on tokio channels.
//!
//! Every bound address owns an mpsc queue of `(request, reply slot)` pairs.
//! Requests to an address nobody listens on fail immediately with
//! [`WireError::Unreachable`], which is also what a peer sees once the
//! listener has been dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::address::Address;
use crate::error::WireError;
use crate::message::Message;
use crate::traits::{Listener, Network, ReplyToken, Route};

type Inbox = mpsc::Sender<(Message, oneshot::Sender<Message>)>;
type Endpoints = Arc<Mutex<HashMap<Address, Inbox>>>;

#[derive(Default, Clone)]
pub struct LocalNetwork {
    endpoints: Endpoints,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn inbox(&self, to: &Address) -> Option<Inbox> {
        self.endpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(to)
            .cloned()
    }
}

#[async_trait]
impl Network for LocalNetwork {
    async fn request(&self, to: &Address, message: Message) -> Result<Message, WireError> {
        let inbox = self
            .inbox(to)
            .ok_or_else(|| WireError::Unreachable(to.to_string()))?;
        let (tx, rx) = oneshot::channel();
        inbox
            .send((message, tx))
            .await
            .map_err(|_| WireError::Unreachable(to.to_string()))?;
        // A listener that shuts down with the request still queued drops the slot.
        rx.await.map_err(|_| WireError::Unreachable(to.to_string()))
    }

    async fn bind(&self, at: &Address) -> Result<Box<dyn Listener>, WireError> {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        if endpoints.get(at).is_some_and(|inbox| !inbox.is_closed()) {
            return Err(WireError::Transport(format!("address {at} already in use")));
        }
        let (tx, rx) = mpsc::channel(256);
        endpoints.insert(at.clone(), tx.clone());
        debug!(address = %at, "bound local listener");
        Ok(Box::new(LocalListener {
            address: at.clone(),
            own: tx,
            inbox: tokio::sync::Mutex::new(rx),
            endpoints: Arc::clone(&self.endpoints),
        }))
    }

    async fn forget(&self, _to: &Address) {}
}

pub struct LocalListener {
    address: Address,
    own: Inbox,
    inbox: tokio::sync::Mutex<mpsc::Receiver<(Message, oneshot::Sender<Message>)>>,
    endpoints: Endpoints,
}

#[async_trait]
impl Listener for LocalListener {
    async fn recv_request(&self) -> Result<(ReplyToken, Message), WireError> {
        let (message, slot) = self.inbox.lock().await.recv().await.ok_or(WireError::Closed)?;
        Ok((
            ReplyToken {
                route: Route::Local(slot),
            },
            message,
        ))
    }

    async fn send_reply(&self, token: ReplyToken, reply: Message) -> Result<(), WireError> {
        match token.route {
            Route::Local(slot) => slot
                .send(reply)
                .map_err(|_| WireError::Transport("requester went away".into())),
            Route::Zmq { .. } => Err(WireError::Transport(
                "reply token does not belong to a local listener".into(),
            )),
        }
    }

    fn address(&self) -> &Address {
        &self.address
    }
}

impl Drop for LocalListener {
    fn drop(&mut self) {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(|e| e.into_inner());
        if endpoints
            .get(&self.address)
            .is_some_and(|inbox| inbox.same_channel(&self.own))
        {
            endpoints.remove(&self.address);
        }
    }
}
