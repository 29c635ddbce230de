//! Request/reply over ZeroMQ DEALER/ROUTER sockets.
//!
//! - [`ZmqRequestClient`] wraps a DEALER socket connected to one peer
//! - [`ZmqRequestServer`] wraps a ROUTER socket bound to a local address
//!
//! Both sockets are owned by a background task that multiplexes outbound
//! sends (fed by an mpsc channel) and inbound receives with `tokio::select!`,
//! so a handler replying late never waits on a receive in progress.
//!
//! The server answers heartbeats itself, without involving the listener.
//! A client waiting on a long request uses them to tell a busy peer from a
//! dead one.
//!
//! ## Framing (zeromq-rs 0.4)
//!
//! ROUTER pushes the peer identity as first frame on recv and pops it on send.
//! - DEALER sends: `[op, envelope]`
//! - ROUTER receives: `[identity, op, envelope]`
//! - ROUTER sends: `[identity, op, envelope]`
//! - DEALER receives: `[op, envelope]`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

use crate::address::Address;
use crate::error::WireError;
use crate::message::{Message, HEARTBEAT_OP};
use crate::traits::{Listener, ReplyToken, Route};

type Pending = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Message>>>>;

/// Encode `[op, envelope]` frames, optionally behind a routing identity.
fn encode_frames(identity: Option<Vec<u8>>, message: &Message) -> Result<ZmqMessage, WireError> {
    let envelope = message.to_bytes()?;
    let mut zmq_msg = match identity {
        Some(identity) => {
            let mut m = ZmqMessage::from(identity);
            m.push_back(message.op.as_bytes().to_vec().into());
            m
        }
        None => ZmqMessage::from(message.op.as_str()),
    };
    zmq_msg.push_back(envelope.into());
    Ok(zmq_msg)
}

/// Pull the envelope out of `[.., op, envelope]`, skipping empty delimiters.
fn decode_envelope<'a>(frames: impl Iterator<Item = &'a [u8]>) -> Result<Message, WireError> {
    let data: Vec<&[u8]> = frames.skip_while(|f| f.is_empty()).collect();
    if data.len() < 2 {
        return Err(WireError::Transport(format!(
            "expected [op, envelope], got {} frames",
            data.len()
        )));
    }
    Ok(Message::from_bytes(data[1])?)
}

/// DEALER-socket client issuing requests to a single peer.
pub struct ZmqRequestClient {
    address: Address,
    send_tx: mpsc::Sender<ZmqMessage>,
    pending: Pending,
    loop_handle: JoinHandle<()>,
}

impl ZmqRequestClient {
    /// Connect a DEALER socket to the peer's ROUTER.
    ///
    /// Fails with [`WireError::Unreachable`] if the connection cannot be made
    /// within `connect_timeout`.
    #[instrument(skip_all, fields(peer = %address))]
    pub async fn connect(address: &Address, connect_timeout: Duration) -> Result<Self, WireError> {
        let mut socket = DealerSocket::new();
        let endpoint = address.endpoint();
        debug!(endpoint = %endpoint, "connecting DEALER socket");
        match tokio::time::timeout(connect_timeout, socket.connect(&endpoint)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "connect failed");
                return Err(WireError::Unreachable(address.to_string()));
            }
            Err(_) => return Err(WireError::Unreachable(address.to_string())),
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (send_tx, send_rx) = mpsc::channel::<ZmqMessage>(256);
        let loop_pending = Arc::clone(&pending);
        let loop_handle = tokio::spawn(async move {
            Self::event_loop(socket, send_rx, loop_pending).await;
        });

        Ok(Self {
            address: address.clone(),
            send_tx,
            pending,
            loop_handle,
        })
    }

    async fn event_loop(
        mut socket: DealerSocket,
        mut send_rx: mpsc::Receiver<ZmqMessage>,
        pending: Pending,
    ) {
        loop {
            tokio::select! {
                Some(zmq_msg) = send_rx.recv() => {
                    if let Err(e) = socket.send(zmq_msg).await {
                        warn!(error = %e, "DEALER send failed");
                    }
                }
                result = socket.recv() => {
                    match result {
                        Ok(zmq_msg) => Self::dispatch_reply(&pending, zmq_msg).await,
                        Err(e) => {
                            debug!(error = %e, "DEALER recv loop ending");
                            break;
                        }
                    }
                }
                else => break,
            }
        }
        // Dropping the senders wakes every waiting caller with a closed channel.
        pending.lock().await.clear();
    }

    async fn dispatch_reply(pending: &Mutex<HashMap<Uuid, oneshot::Sender<Message>>>, zmq_msg: ZmqMessage) {
        let message = match decode_envelope(zmq_msg.iter().map(|f| f.as_ref())) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to decode reply");
                return;
            }
        };
        match pending.lock().await.remove(&message.correlation_id) {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => {
                debug!(correlation_id = %message.correlation_id, "reply for unknown or expired request");
            }
        }
    }

    /// Register a reply slot for `message` and queue it for sending.
    async fn send(&self, message: &Message) -> Result<oneshot::Receiver<Message>, WireError> {
        let cid = message.correlation_id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(cid, tx);

        let zmq_msg = match encode_frames(None, message) {
            Ok(m) => m,
            Err(e) => {
                self.pending.lock().await.remove(&cid);
                return Err(e);
            }
        };
        if self.send_tx.send(zmq_msg).await.is_err() {
            self.pending.lock().await.remove(&cid);
            return Err(WireError::Unreachable(self.address.to_string()));
        }
        debug!(correlation_id = %cid, op = %message.op, peer = %self.address, "sent request");
        Ok(rx)
    }

    /// Send a request and wait for the reply with the same correlation id.
    pub async fn request(&self, message: Message, timeout: Duration) -> Result<Message, WireError> {
        let cid = message.correlation_id;
        let rx = self.send(&message).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(WireError::Unreachable(self.address.to_string())),
            Err(_) => {
                self.pending.lock().await.remove(&cid);
                Err(WireError::Timeout {
                    address: self.address.to_string(),
                    after: timeout,
                })
            }
        }
    }

    /// Send a request and wait for its reply with no deadline, as long as
    /// the peer keeps answering heartbeats. One goes out every `heartbeat`
    /// and must be answered within the same interval; a missed one fails
    /// the request with [`WireError::Unreachable`].
    pub async fn request_supervised(
        &self,
        message: Message,
        heartbeat: Duration,
    ) -> Result<Message, WireError> {
        let cid = message.correlation_id;
        let mut rx = self.send(&message).await?;

        let mut ticks = tokio::time::interval(heartbeat);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticks.tick().await;
        loop {
            tokio::select! {
                reply = &mut rx => {
                    return reply.map_err(|_| WireError::Unreachable(self.address.to_string()));
                }
                _ = ticks.tick() => {
                    if let Err(e) = self.request(Message::heartbeat()?, heartbeat).await {
                        debug!(peer = %self.address, error = %e, "heartbeat missed");
                        self.pending.lock().await.remove(&cid);
                        return Err(WireError::Unreachable(self.address.to_string()));
                    }
                }
            }
        }
    }
}

impl Drop for ZmqRequestClient {
    fn drop(&mut self) {
        self.loop_handle.abort();
    }
}

/// ROUTER-socket server bound to a local address.
pub struct ZmqRequestServer {
    address: Address,
    inbound: Mutex<mpsc::Receiver<(ReplyToken, Message)>>,
    outbound: mpsc::Sender<ZmqMessage>,
    loop_handle: JoinHandle<()>,
}

impl ZmqRequestServer {
    #[instrument(skip_all, fields(address = %address))]
    pub async fn bind(address: &Address) -> Result<Self, WireError> {
        let mut socket = RouterSocket::new();
        let endpoint = address.endpoint();
        info!(endpoint = %endpoint, "binding ROUTER socket");
        socket.bind(&endpoint).await?;

        let (in_tx, in_rx) = mpsc::channel(256);
        let (out_tx, out_rx) = mpsc::channel(256);
        let loop_handle = tokio::spawn(async move {
            Self::event_loop(socket, in_tx, out_rx).await;
        });

        Ok(Self {
            address: address.clone(),
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            loop_handle,
        })
    }

    async fn event_loop(
        mut socket: RouterSocket,
        in_tx: mpsc::Sender<(ReplyToken, Message)>,
        mut out_rx: mpsc::Receiver<ZmqMessage>,
    ) {
        loop {
            tokio::select! {
                Some(zmq_msg) = out_rx.recv() => {
                    if let Err(e) = socket.send(zmq_msg).await {
                        warn!(error = %e, "ROUTER send failed");
                    }
                }
                result = socket.recv() => {
                    let zmq_msg = match result {
                        Ok(m) => m,
                        Err(e) => {
                            debug!(error = %e, "ROUTER recv loop ending");
                            break;
                        }
                    };
                    let mut frames = zmq_msg.iter().map(|f| f.as_ref());
                    let Some(identity) = frames.next().map(|f| f.to_vec()) else {
                        continue;
                    };
                    match decode_envelope(frames) {
                        Ok(message) if message.op == HEARTBEAT_OP => {
                            let beat = message
                                .reply(&())
                                .map_err(WireError::from)
                                .and_then(|reply| encode_frames(Some(identity), &reply));
                            match beat {
                                Ok(zmq_msg) => {
                                    if let Err(e) = socket.send(zmq_msg).await {
                                        warn!(error = %e, "heartbeat reply failed");
                                    }
                                }
                                Err(e) => warn!(error = %e, "failed to encode heartbeat reply"),
                            }
                        }
                        Ok(message) => {
                            let token = ReplyToken { route: Route::Zmq { identity } };
                            if in_tx.send((token, message)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping malformed request"),
                    }
                }
                else => break,
            }
        }
    }
}

impl Drop for ZmqRequestServer {
    fn drop(&mut self) {
        self.loop_handle.abort();
    }
}

#[async_trait]
impl Listener for ZmqRequestServer {
    async fn recv_request(&self) -> Result<(ReplyToken, Message), WireError> {
        let (token, message) = self.inbound.lock().await.recv().await.ok_or(WireError::Closed)?;
        debug!(
            correlation_id = %message.correlation_id,
            op = %message.op,
            "received request"
        );
        Ok((token, message))
    }

    async fn send_reply(&self, token: ReplyToken, reply: Message) -> Result<(), WireError> {
        let Route::Zmq { identity } = token.route else {
            return Err(WireError::Transport(
                "reply token does not belong to a ZeroMQ listener".into(),
            ));
        };
        let zmq_msg = encode_frames(Some(identity), &reply)?;
        self.outbound.send(zmq_msg).await.map_err(|_| WireError::Closed)?;
        debug!(correlation_id = %reply.correlation_id, op = %reply.op, "sent reply");
        Ok(())
    }

    fn address(&self) -> &Address {
        &self.address
    }
}
