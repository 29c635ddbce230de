use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::address::Address;
use crate::error::WireError;
use crate::message::Message;
use crate::reqrep::{ZmqRequestClient, ZmqRequestServer};
use crate::traits::{Listener, Network};

/// [`Network`] over ZeroMQ TCP sockets.
///
/// Keeps one DEALER client per peer. A client is discarded after any
/// connectivity failure so the next request reconnects from scratch.
///
/// `request_timeout` bounds connecting, plain requests, and each heartbeat
/// of a supervised request. A supervised reply itself has no deadline.
pub struct ZmqNetwork {
    clients: Mutex<HashMap<Address, Arc<ZmqRequestClient>>>,
    request_timeout: Duration,
}

impl ZmqNetwork {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            request_timeout,
        }
    }

    async fn client(&self, to: &Address) -> Result<Arc<ZmqRequestClient>, WireError> {
        if let Some(client) = self.clients.lock().await.get(to) {
            return Ok(Arc::clone(client));
        }
        // Connect unlocked so a dead peer does not stall requests to others.
        let client = Arc::new(ZmqRequestClient::connect(to, self.request_timeout).await?);
        let mut clients = self.clients.lock().await;
        Ok(Arc::clone(clients.entry(to.clone()).or_insert(client)))
    }

    async fn settle(
        &self,
        to: &Address,
        result: Result<Message, WireError>,
    ) -> Result<Message, WireError> {
        if let Err(e) = &result {
            if e.is_connectivity() {
                debug!(peer = %to, error = %e, "dropping cached connection");
                self.forget(to).await;
            }
        }
        result
    }
}

impl Default for ZmqNetwork {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Network for ZmqNetwork {
    async fn request(&self, to: &Address, message: Message) -> Result<Message, WireError> {
        let client = self.client(to).await?;
        let result = client.request(message, self.request_timeout).await;
        self.settle(to, result).await
    }

    async fn request_supervised(
        &self,
        to: &Address,
        message: Message,
    ) -> Result<Message, WireError> {
        let client = self.client(to).await?;
        let result = client.request_supervised(message, self.request_timeout).await;
        self.settle(to, result).await
    }

    async fn bind(&self, at: &Address) -> Result<Box<dyn Listener>, WireError> {
        Ok(Box::new(ZmqRequestServer::bind(at).await?))
    }

    async fn forget(&self, to: &Address) {
        self.clients.lock().await.remove(to);
    }
}
