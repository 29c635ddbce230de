use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::WireError;
use crate::traits::{Listener, Service};

/// Run the request loop for `service` on `listener` until `shutdown` fires.
///
/// Each request is handled in its own task so a slow handler does not hold up
/// the next request. Once `shutdown` is notified the loop stops receiving,
/// waits for every in-flight handler to reply, and then drops the listener,
/// which closes the endpoint.
///
/// `shutdown` is consumed with `notified()`, so trigger it with
/// [`Notify::notify_one`]; a permit stored before the loop starts still counts.
pub async fn serve<S: Service>(
    listener: Box<dyn Listener>,
    service: Arc<S>,
    shutdown: Arc<Notify>,
) -> Result<(), WireError> {
    let listener: Arc<dyn Listener> = Arc::from(listener);
    let address = listener.address().clone();
    let mut in_flight = JoinSet::new();
    info!(%address, "serving");

    let outcome = loop {
        while in_flight.try_join_next().is_some() {}

        tokio::select! {
            _ = shutdown.notified() => break Ok(()),
            received = listener.recv_request() => {
                let (token, request) = match received {
                    Ok(r) => r,
                    Err(e) => break Err(e),
                };
                let listener = Arc::clone(&listener);
                let service = Arc::clone(&service);
                in_flight.spawn(async move {
                    let op = request.op.clone();
                    match service.handle(request).await {
                        Ok(reply) => {
                            if let Err(e) = listener.send_reply(token, reply).await {
                                warn!(%op, error = %e, "failed to send reply");
                            }
                        }
                        Err(e) => warn!(%op, error = %e, "dropping request without reply"),
                    }
                });
            }
        }
    };

    if !in_flight.is_empty() {
        debug!(%address, pending = in_flight.len(), "draining in-flight requests");
    }
    while in_flight.join_next().await.is_some() {}
    info!(%address, "stopped serving");
    outcome
}
