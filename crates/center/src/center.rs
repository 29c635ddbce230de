use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use locus_core::protocol::{decode_request, respond, CenterReply, CenterRequest, ServiceError};
use locus_wire::{serve, Address, Message, Network, Service, WireError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::state::CenterState;

/// The cluster registry. Passive: it only answers requests and never calls
/// out to workers.
pub struct Center {
    state: Mutex<CenterState>,
    shutdown: Arc<Notify>,
}

impl Center {
    /// Bind `address` on `network` and start serving.
    #[instrument(skip_all, fields(%address))]
    pub async fn start(
        network: Arc<dyn Network>,
        address: Address,
    ) -> Result<CenterHandle, WireError> {
        let listener = network.bind(&address).await?;
        let shutdown = Arc::new(Notify::new());
        let center = Arc::new(Center {
            state: Mutex::new(CenterState::new()),
            shutdown: Arc::clone(&shutdown),
        });
        let task = tokio::spawn(serve(listener, center, Arc::clone(&shutdown)));
        info!("center started");
        Ok(CenterHandle {
            address,
            shutdown,
            task,
        })
    }

    fn state(&self) -> MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn apply(&self, request: CenterRequest) -> CenterReply {
        let mut state = self.state();
        match request {
            CenterRequest::Register { address, ncores } => {
                info!(%address, ncores, "worker registered");
                state.register(address, ncores);
                CenterReply::Ack
            }
            CenterRequest::Deregister { address } => {
                info!(%address, "worker deregistered");
                state.deregister(&address);
                CenterReply::Ack
            }
            CenterRequest::AddKeys { address, keys } => {
                debug!(%address, count = keys.len(), "keys held");
                state.add_keys(&address, keys);
                CenterReply::Ack
            }
            CenterRequest::RemoveKeys { address, keys } => {
                debug!(%address, count = keys.len(), "keys dropped");
                state.remove_keys(&address, &keys);
                CenterReply::Ack
            }
            CenterRequest::WhoHas { keys } => CenterReply::WhoHas(state.who_has(keys.as_deref())),
            CenterRequest::HasWhat { address } => CenterReply::HasWhat(state.has_what(&address)),
            CenterRequest::Ncores => CenterReply::Ncores(state.ncores()),
            CenterRequest::Terminate => {
                info!("terminate requested");
                self.shutdown.notify_one();
                CenterReply::Ack
            }
        }
    }
}

#[async_trait]
impl Service for Center {
    async fn handle(&self, request: Message) -> Result<Message, WireError> {
        let decoded = match decode_request::<CenterRequest>(&request) {
            Ok(r) => r,
            Err(reply) => return Ok(reply),
        };
        let reply: Result<CenterReply, ServiceError> = Ok(self.apply(decoded));
        respond(&request, &reply)
    }
}

/// Handle to a running [`Center`].
pub struct CenterHandle {
    address: Address,
    shutdown: Arc<Notify>,
    task: JoinHandle<Result<(), WireError>>,
}

impl CenterHandle {
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Ask the center to stop. In-flight requests are still answered.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Wait until the center has stopped serving.
    pub async fn join(self) -> Result<(), WireError> {
        self.task
            .await
            .map_err(|e| WireError::Transport(format!("center task failed: {e}")))?
    }

    /// Stop and wait.
    pub async fn shutdown(self) -> Result<(), WireError> {
        self.stop();
        self.join().await
    }
}
