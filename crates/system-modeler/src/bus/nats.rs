//! NATS transport. Routing key and message type travel in headers, the payload as the body.

use super::{Delivery, Message, MessageBus, Subscription};
use crate::{Result, SyncError};
use async_nats::{Client, ConnectOptions, HeaderMap};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const KEY_HEADER: &str = "Message-Key";
const TYPE_HEADER: &str = "Message-Type";

/// Message bus backed by a NATS connection
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    pub async fn connect(url: &str, name: &str) -> Result<Self> {
        tracing::info!("Connecting to NATS at {url}");
        let client = ConnectOptions::new()
            .name(name)
            .connection_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| SyncError::Transport(format!("Failed to connect: {e}")))?;
        tracing::info!("Connected to NATS at {url}");
        Ok(Self { client })
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(KEY_HEADER, message.key.as_str());
        headers.insert(TYPE_HEADER, message.message_type.as_str());
        self.client
            .publish_with_headers(topic.to_string(), headers, Bytes::from(message.payload))
            .await
            .map_err(|e| SyncError::Transport(format!("Publish to {topic} failed: {e}")))
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| SyncError::Transport(format!("Subscribe to {topic} failed: {e}")))?;
        Ok(Box::new(NatsSubscription {
            topic: topic.to_string(),
            subscriber,
            sequence: 0,
        }))
    }
}

struct NatsSubscription {
    topic: String,
    subscriber: async_nats::Subscriber,
    sequence: u64,
}

fn header(message: &async_nats::Message, name: &str) -> String {
    message
        .headers
        .as_ref()
        .and_then(|headers| headers.get(name))
        .map(|value| value.as_str().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl Subscription for NatsSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<Delivery>> {
        let received = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            received = self.subscriber.next() => received,
        };
        let Some(received) = received else {
            return Ok(None);
        };
        let payload = String::from_utf8(received.payload.to_vec()).map_err(|e| {
            SyncError::Transport(format!("Payload on {} is not UTF-8: {e}", self.topic))
        })?;

        self.sequence += 1;
        Ok(Some(Delivery {
            topic: self.topic.clone(),
            message: Message {
                key: header(&received, KEY_HEADER),
                message_type: header(&received, TYPE_HEADER),
                payload,
            },
            sequence: self.sequence,
        }))
    }

    /// Core NATS has no acknowledgements
    async fn complete(&mut self, _delivery: &Delivery) -> Result<()> {
        Ok(())
    }
}
