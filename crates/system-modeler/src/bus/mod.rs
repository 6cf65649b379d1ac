//! Publish/subscribe boundary
//!
//! Topics are plain strings. A [`Message`] carries a routing key (the originating device's
//! intersection id), a type name the consumer dispatches on, and a UTF-8 JSON payload.

mod memory;
#[cfg(feature = "nats")]
mod nats;

pub use memory::MemoryBus;
#[cfg(feature = "nats")]
pub use nats::NatsBus;

use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Envelope of everything sent over the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: String,
    pub message_type: String,
    pub payload: String,
}

impl Message {
    /// Message keyed by `device_id` with `value` serialized as its payload
    pub fn new(
        device_id: Uuid,
        message_type: impl Into<String>,
        value: &impl Serialize,
    ) -> Result<Self> {
        Ok(Self {
            key: device_id.to_string(),
            message_type: message_type.into(),
            payload: serde_json::to_string(value)?,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// A message as received from one subscription
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub message: Message,
    /// Position within the subscription, starting at 1
    pub sequence: u64,
}

impl Delivery {
    /// Device id recovered from the routing key
    pub fn device_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.message.key).ok()
    }

    pub fn message_type(&self) -> &str {
        &self.message.message_type
    }
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, message: Message) -> Result<()>;

    /// Start receiving every message published to `topic` from now on
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>>;
}

#[async_trait]
pub trait Subscription: Send + Sync {
    fn topic(&self) -> &str;

    /// Wait for the next delivery
    ///
    /// Returns `Ok(None)` once the subscription can never yield again and
    /// `Err(SyncError::Cancelled)` as soon as `cancel` fires.
    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<Delivery>>;

    /// Acknowledge that `delivery` has been handled
    async fn complete(&mut self, delivery: &Delivery) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_from_key() {
        let id = Uuid::new_v4();
        let message = Message::new(id, "Ping", &serde_json::json!({})).unwrap();
        let delivery = Delivery {
            topic: "t".into(),
            message,
            sequence: 1,
        };
        assert_eq!(delivery.device_id(), Some(id));
        assert_eq!(delivery.message_type(), "Ping");

        let anonymous = Delivery {
            message: Message {
                key: "not-a-uuid".into(),
                ..delivery.message.clone()
            },
            ..delivery
        };
        assert_eq!(anonymous.device_id(), None);
    }
}
