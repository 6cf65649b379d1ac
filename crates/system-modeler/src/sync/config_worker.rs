//! Authoritative side: answers config requests from edge devices

use super::{CONFIG_REQUEST_TYPE, Handler, consume};
use crate::bus::{Delivery, MessageBus, Subscription};
use crate::service::ModelerService;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const WORKER: &str = "config request worker";

struct RequestHandler {
    service: Arc<dyn ModelerService>,
}

#[async_trait]
impl Handler for RequestHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        if delivery.message_type() != CONFIG_REQUEST_TYPE {
            tracing::debug!(message_type = delivery.message_type(), "Ignoring message");
            return Ok(());
        }
        let Some(intersection) = delivery.device_id() else {
            tracing::warn!(key = %delivery.message.key, "Config request without a device id");
            return Ok(());
        };
        tracing::info!(%intersection, "Config requested");
        self.service.publish_config(intersection).await
    }
}

/// Subscribed to the request topic; publishes each requester's configuration
pub struct ConfigRequestWorker {
    subscription: Box<dyn Subscription>,
    handler: RequestHandler,
}

impl ConfigRequestWorker {
    /// Subscribe to `request_topic`; requests published from now on will be answered once
    /// [`run`](Self::run) is polled
    pub async fn subscribe(
        service: Arc<dyn ModelerService>,
        bus: &dyn MessageBus,
        request_topic: &str,
    ) -> Result<Self> {
        let subscription = bus.subscribe(request_topic).await?;
        tracing::info!(topic = request_topic, "Subscribed topic");
        Ok(Self {
            subscription,
            handler: RequestHandler { service },
        })
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        consume(WORKER, self.subscription.as_mut(), &self.handler, &cancel).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryBus, Message};
    use crate::sync::{ConfigRequest, ConfigResponse};
    use crate::SyncError;
    use std::sync::Mutex;
    use system_modeler_lib::EntityModel;
    use uuid::Uuid;

    /// Records publish requests; fails for the nil id
    #[derive(Default)]
    struct Recorder {
        published: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl ModelerService for Recorder {
        async fn get_all(&self) -> Result<Vec<EntityModel>> {
            Ok(vec![])
        }
        async fn get_all_by_intersection_id(&self, _id: Uuid) -> Result<Vec<EntityModel>> {
            Ok(vec![])
        }
        async fn get_by_id(&self, id: Uuid) -> Result<EntityModel> {
            Err(system_modeler_lib::ModelerError::EntityNotFound(id).into())
        }
        async fn add(&self, model: EntityModel) -> Result<EntityModel> {
            Ok(model)
        }
        async fn update(&self, model: EntityModel) -> Result<EntityModel> {
            Ok(model)
        }
        async fn soft_delete(&self, _id: Uuid) -> bool {
            true
        }
        async fn delete(&self, _id: Uuid) -> bool {
            true
        }
        async fn soft_delete_by_intersection(&self, _id: Uuid) -> bool {
            true
        }
        async fn publish_config(&self, id: Uuid) -> Result<()> {
            if id.is_nil() {
                return Err(SyncError::Transport("broker unavailable".into()));
            }
            self.published.lock().unwrap().push(id);
            Ok(())
        }
    }

    async fn wait_for_acks(bus: &MemoryBus, topic: &str, count: u64) {
        while bus.acknowledged(topic) < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_worker() {
        let bus = MemoryBus::new();
        let recorder = Arc::new(Recorder::default());
        let worker = ConfigRequestWorker::subscribe(recorder.clone(), &bus, "requests")
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        let good = Uuid::new_v4();
        let anonymous = Message {
            key: "no-device".into(),
            ..ConfigRequest::default().into_message(good).unwrap()
        };
        let unrelated = ConfigResponse::from_models(&[])
            .unwrap()
            .into_message(good)
            .unwrap();
        for message in [
            ConfigRequest::default().into_message(Uuid::nil()).unwrap(),
            anonymous,
            unrelated,
            ConfigRequest::default().into_message(good).unwrap(),
        ] {
            bus.publish("requests", message).await.unwrap();
        }

        wait_for_acks(&bus, "requests", 4).await;
        assert_eq!(*recorder.published.lock().unwrap(), vec![good]);

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(bus.subscriber_count("requests"), 0);
    }
}
