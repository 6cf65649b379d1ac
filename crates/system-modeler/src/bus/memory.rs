//! In-process bus: per-topic fan-out over unbounded channels
//!
//! Like a core pub/sub broker, messages published to a topic without subscribers are dropped.

use super::{Delivery, Message, MessageBus, Subscription};
use crate::{Result, SyncError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Topics {
    subscribers: DashMap<String, Vec<mpsc::UnboundedSender<Message>>>,
    acknowledged: DashMap<String, u64>,
}

/// Cheaply cloneable handle to one in-memory broker
#[derive(Clone, Default)]
pub struct MemoryBus {
    topics: Arc<Topics>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live subscriptions on `topic`
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .subscribers
            .get(topic)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    /// Deliveries on `topic` acknowledged so far, across all its subscriptions
    pub fn acknowledged(&self, topic: &str) -> u64 {
        self.topics.acknowledged.get(topic).map_or(0, |count| *count)
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, topic: &str, message: Message) -> Result<()> {
        let Some(mut senders) = self.topics.subscribers.get_mut(topic) else {
            tracing::debug!(topic, "No subscribers, dropping message");
            return Ok(());
        };
        senders.retain(|sender| sender.send(message.clone()).is_ok());
        tracing::debug!(
            topic,
            subscribers = senders.len(),
            message_type = %message.message_type,
            "Published"
        );
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(Box::new(MemorySubscription {
            topic: topic.to_string(),
            receiver,
            sequence: 0,
            topics: self.topics.clone(),
        }))
    }
}

struct MemorySubscription {
    topic: String,
    receiver: mpsc::UnboundedReceiver<Message>,
    sequence: u64,
    topics: Arc<Topics>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<Delivery>> {
        let message = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            message = self.receiver.recv() => message,
        };
        Ok(message.map(|message| {
            self.sequence += 1;
            Delivery {
                topic: self.topic.clone(),
                message,
                sequence: self.sequence,
            }
        }))
    }

    async fn complete(&mut self, delivery: &Delivery) -> Result<()> {
        *self
            .topics
            .acknowledged
            .entry(delivery.topic.clone())
            .or_default() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ping() -> Message {
        Message::new(Uuid::new_v4(), "Ping", &serde_json::json!({ "n": 1 })).unwrap()
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let bus = MemoryBus::new();
        let cancel = CancellationToken::new();
        let mut a = bus.subscribe("t").await.unwrap();
        let mut b = bus.subscribe("t").await.unwrap();
        let mut other = bus.subscribe("u").await.unwrap();

        let message = ping();
        bus.publish("t", message.clone()).await.unwrap();

        for sub in [&mut a, &mut b] {
            let delivery = sub.next(&cancel).await.unwrap().unwrap();
            assert_eq!(delivery.message, message);
            assert_eq!(delivery.sequence, 1);
            sub.complete(&delivery).await.unwrap();
        }
        assert_eq!(bus.acknowledged("t"), 2);

        cancel.cancel();
        assert!(matches!(other.next(&cancel).await, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = MemoryBus::new();
        bus.publish("t", ping()).await.unwrap();

        let mut late = bus.subscribe("t").await.unwrap();
        bus.publish("t", ping()).await.unwrap();
        let delivery = late.next(&CancellationToken::new()).await.unwrap().unwrap();
        assert_eq!(delivery.sequence, 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe("t").await.unwrap();
        assert_eq!(bus.subscriber_count("t"), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count("t"), 0);
        bus.publish("t", ping()).await.unwrap();
    }
}
