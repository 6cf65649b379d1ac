//! Edge side: asks for this intersection's configuration and keeps the snapshot current

use super::{
    CONFIG_RESPONSE_TYPE, ConfigRequest, ConfigResponse, Handler, consume, response_topic,
};
use crate::bus::{Delivery, MessageBus, Subscription};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use system_modeler_lib::SnapshotFile;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const WORKER: &str = "edge config worker";

struct ResponseHandler {
    snapshot: SnapshotFile,
}

#[async_trait]
impl Handler for ResponseHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        if delivery.message_type() != CONFIG_RESPONSE_TYPE {
            tracing::debug!(message_type = delivery.message_type(), "Ignoring message");
            return Ok(());
        }
        let Some(intersection) = delivery.device_id() else {
            tracing::warn!(key = %delivery.message.key, "Config response without a device id");
            return Ok(());
        };
        let models = delivery.message.decode::<ConfigResponse>()?.models()?;
        // Whole-file replace; the query engine picks it up when its cache entry expires
        self.snapshot.save(&models).await?;
        tracing::info!(%intersection, count = models.len(), "Snapshot replaced");
        Ok(())
    }
}

/// Subscribed to `<response topic>.<intersection>`; overwrites the snapshot on every response
pub struct EdgeConfigWorker {
    intersection: Uuid,
    bus: Arc<dyn MessageBus>,
    request_topic: String,
    subscription: Box<dyn Subscription>,
    handler: ResponseHandler,
}

impl EdgeConfigWorker {
    pub async fn subscribe(
        intersection: Uuid,
        snapshot: SnapshotFile,
        bus: Arc<dyn MessageBus>,
        request_topic: impl Into<String>,
        response_base_topic: &str,
    ) -> Result<Self> {
        let topic = response_topic(response_base_topic, intersection);
        let subscription = bus.subscribe(&topic).await?;
        tracing::info!(%topic, "Subscribed topic");
        Ok(Self {
            intersection,
            bus,
            request_topic: request_topic.into(),
            subscription,
            handler: ResponseHandler { snapshot },
        })
    }

    /// Ask the authoritative side for this intersection's configuration
    pub async fn request_config(&self) -> Result<()> {
        let message = ConfigRequest::default().into_message(self.intersection)?;
        self.bus.publish(&self.request_topic, message).await?;
        tracing::info!(
            intersection = %self.intersection,
            topic = %self.request_topic,
            "Requested config"
        );
        Ok(())
    }

    /// Request the configuration once, then apply responses until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        if let Err(e) = self.request_config().await {
            // Pushed updates still arrive; the next restart asks again
            tracing::error!(intersection = %self.intersection, "Config request failed: {e}");
        }
        consume(WORKER, self.subscription.as_mut(), &self.handler, &cancel).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, Message};
    use crate::sync::CONFIG_REQUEST_TYPE;
    use geo::coord;
    use system_modeler_lib::{EntityModel, EntityType, Geometry};

    const REQUESTS: &str = "requests";
    const RESPONSES: &str = "responses";

    #[tokio::test]
    async fn test_requests_then_replaces_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("config.json"));
        let bus = MemoryBus::new();
        let intersection = Uuid::new_v4();
        let mut requests = bus.subscribe(REQUESTS).await.unwrap();

        let worker = EdgeConfigWorker::subscribe(
            intersection,
            snapshot.clone(),
            Arc::new(bus.clone()),
            REQUESTS,
            RESPONSES,
        )
        .await
        .unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        let request = requests.next(&cancel).await.unwrap().unwrap();
        assert_eq!(request.message_type(), CONFIG_REQUEST_TYPE);
        assert_eq!(request.device_id(), Some(intersection));

        let topic = response_topic(RESPONSES, intersection);
        let model = EntityModel::new(
            EntityType::Intersection,
            Geometry::point(coord! { x: -83.0479, y: 42.5361 }),
        );
        let garbage = Message {
            payload: "{ not json".into(),
            ..ConfigResponse::from_models(&[]).unwrap().into_message(intersection).unwrap()
        };
        bus.publish(&topic, garbage).await.unwrap();
        let response = ConfigResponse::from_models(std::slice::from_ref(&model))
            .unwrap()
            .into_message(intersection)
            .unwrap();
        bus.publish(&topic, response).await.unwrap();

        while bus.acknowledged(&topic) < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(snapshot.load().await.unwrap(), vec![model]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
