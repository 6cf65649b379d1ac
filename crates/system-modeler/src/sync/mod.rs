//! Config sync protocol
//!
//! The edge device publishes a [`ConfigRequest`] keyed by its intersection id; the
//! authoritative [`ConfigRequestWorker`] answers on `<response topic>.<intersection>` with the
//! intersection's full entity set, which the [`EdgeConfigWorker`] writes over the local
//! snapshot. Mutations on the authoritative side push the same response unprompted.
//!
//! Workers handle one message at a time in delivery order. A failure while handling a message
//! is logged and the message is still acknowledged, so a poison message cannot stall the
//! subscription. Cancellation stops a worker quietly.

mod config_worker;
mod edge_worker;
mod messages;

pub use config_worker::ConfigRequestWorker;
pub use edge_worker::EdgeConfigWorker;
pub use messages::{
    CONFIG_REQUEST_TYPE, CONFIG_RESPONSE_TYPE, ConfigRequest, ConfigResponse, response_topic,
};

use crate::bus::{Delivery, Subscription};
use crate::{Result, SyncError};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause after a failed receive before trying again
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
trait Handler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<()>;
}

/// Consume `subscription` until cancelled or closed
async fn consume(
    worker: &str,
    subscription: &mut dyn Subscription,
    handler: &dyn Handler,
    cancel: &CancellationToken,
) {
    loop {
        let delivery = match subscription.next(cancel).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => {
                tracing::info!(
                    worker,
                    topic = subscription.topic(),
                    "Subscription closed, stopping"
                );
                return;
            }
            Err(SyncError::Cancelled) => {
                tracing::info!(worker, "Worker stopping");
                return;
            }
            Err(e) => {
                tracing::error!(worker, topic = subscription.topic(), "Failed to receive: {e}");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(worker, "Worker stopping");
                        return;
                    }
                    _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => continue,
                }
            }
        };

        tracing::debug!(
            worker,
            topic = %delivery.topic,
            sequence = delivery.sequence,
            message_type = delivery.message_type(),
            "Handling message"
        );
        if let Err(e) = handler.handle(&delivery).await {
            tracing::error!(
                worker,
                message_type = delivery.message_type(),
                "Unhandled error while processing message: {e}"
            );
        }
        if let Err(e) = subscription.complete(&delivery).await {
            tracing::warn!(worker, sequence = delivery.sequence, "Failed to acknowledge: {e}");
        }
    }
}
