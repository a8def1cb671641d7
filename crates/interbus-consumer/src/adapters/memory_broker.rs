//! In-memory broker.
//!
//! Each topic is an append-only log with a single shared read cursor.
//! Acknowledged and rejected messages are recorded per topic so callers can
//! check which of the two a message received.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::RawMessage;
use crate::error::BrokerError;
use crate::ports::{BrokerContext, MessageConsumer, OffsetControl, TopicHandle};

#[derive(Debug, Default)]
struct TopicLog {
    messages: Vec<RawMessage>,
    cursor: usize,
    partition: Option<i32>,
    acknowledged: Vec<RawMessage>,
    rejected: Vec<RawMessage>,
    failures: VecDeque<BrokerError>,
}

#[derive(Debug, Default)]
struct Shared {
    topics: Mutex<HashMap<String, TopicLog>>,
    notify: Notify,
}

impl Shared {
    fn take(&self, topic: &str) -> Result<Option<RawMessage>, BrokerError> {
        let mut topics = self.topics.lock();
        let log = topics.entry(topic.to_string()).or_default();
        if let Some(error) = log.failures.pop_front() {
            return Err(error);
        }
        let next = log.messages.get(log.cursor).cloned();
        if next.is_some() {
            log.cursor += 1;
        }
        Ok(next)
    }

    fn with_log<T>(&self, topic: &str, f: impl FnOnce(&mut TopicLog) -> T) -> T {
        f(self.topics.lock().entry(topic.to_string()).or_default())
    }
}

/// Broker keeping topics in process memory. Clones share the same topics.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
    supports_offsets: bool,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::default(),
            supports_offsets: true,
        }
    }

    /// Consumers of this broker will not expose offset control.
    #[must_use]
    pub fn without_offsets(mut self) -> Self {
        self.supports_offsets = false;
        self
    }

    pub fn publish(&self, topic: &str, message: RawMessage) {
        self.shared
            .with_log(topic, |log| log.messages.push(message));
        self.shared.notify.notify_waiters();
    }

    /// Make the next receive on `topic` fail with `error`.
    pub fn fail_next_receive(&self, topic: &str, error: BrokerError) {
        self.shared
            .with_log(topic, |log| log.failures.push_back(error));
    }

    pub fn acknowledged(&self, topic: &str) -> Vec<RawMessage> {
        self.shared.with_log(topic, |log| log.acknowledged.clone())
    }

    pub fn rejected(&self, topic: &str) -> Vec<RawMessage> {
        self.shared.with_log(topic, |log| log.rejected.clone())
    }

    /// Messages not yet handed to a consumer.
    pub fn pending(&self, topic: &str) -> usize {
        self.shared
            .with_log(topic, |log| log.messages.len().saturating_sub(log.cursor))
    }

    /// Partition selected by the last consumer, if any.
    pub fn partition(&self, topic: &str) -> Option<i32> {
        self.shared.with_log(topic, |log| log.partition)
    }
}

#[async_trait]
impl BrokerContext for InMemoryBroker {
    fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError> {
        self.shared.with_log(name, |_| ());
        Ok(TopicHandle {
            name: name.to_string(),
        })
    }

    async fn create_consumer(
        &self,
        topic: &TopicHandle,
    ) -> Result<Box<dyn MessageConsumer>, BrokerError> {
        Ok(Box::new(MemoryConsumer {
            shared: self.shared.clone(),
            topic: topic.name.clone(),
            supports_offsets: self.supports_offsets,
        }))
    }
}

struct MemoryConsumer {
    shared: Arc<Shared>,
    topic: String,
    supports_offsets: bool,
}

#[async_trait]
impl MessageConsumer for MemoryConsumer {
    async fn receive(&mut self, timeout: Duration) -> Result<Option<RawMessage>, BrokerError> {
        let deadline = Instant::now() + timeout;
        let shared = self.shared.clone();
        loop {
            // register interest before checking so a concurrent publish is not missed
            let notified = shared.notify.notified();
            if let Some(message) = shared.take(&self.topic)? {
                return Ok(Some(message));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn acknowledge(&mut self, message: &RawMessage) -> Result<(), BrokerError> {
        self.shared
            .with_log(&self.topic, |log| log.acknowledged.push(message.clone()));
        Ok(())
    }

    async fn reject(&mut self, message: &RawMessage) -> Result<(), BrokerError> {
        self.shared
            .with_log(&self.topic, |log| log.rejected.push(message.clone()));
        Ok(())
    }

    fn offsets(&mut self) -> Option<&mut dyn OffsetControl> {
        if self.supports_offsets {
            Some(self)
        } else {
            None
        }
    }
}

impl OffsetControl for MemoryConsumer {
    fn set_partition(&mut self, partition: i32) {
        self.shared
            .with_log(&self.topic, |log| log.partition = Some(partition));
    }

    fn set_offset(&mut self, offset: i64) {
        let cursor = usize::try_from(offset).unwrap_or(0);
        debug!(topic = %self.topic, cursor, "Seeking");
        self.shared.with_log(&self.topic, |log| log.cursor = cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn consumer(broker: &InMemoryBroker, topic: &str) -> Box<dyn MessageConsumer> {
        let handle = broker.create_topic(topic).unwrap();
        broker.create_consumer(&handle).await.unwrap()
    }

    #[tokio::test]
    async fn test_receive_in_order_then_timeout() {
        let broker = InMemoryBroker::new();
        broker.publish("orders", RawMessage::new("1"));
        broker.publish("orders", RawMessage::new("2"));
        let mut consumer = consumer(&broker, "orders").await;

        let timeout = Duration::from_millis(20);
        assert_eq!(consumer.receive(timeout).await.unwrap().unwrap().body, "1");
        assert_eq!(consumer.receive(timeout).await.unwrap().unwrap().body, "2");
        assert!(consumer.receive(timeout).await.unwrap().is_none());
        assert_eq!(broker.pending("orders"), 0);
    }

    #[tokio::test]
    async fn test_receive_wakes_on_publish() {
        let broker = InMemoryBroker::new();
        let mut consumer = consumer(&broker, "orders").await;

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("orders", RawMessage::new("late"));
        });

        let msg = consumer.receive(Duration::from_secs(5)).await.unwrap();
        assert_eq!(msg.unwrap().body, "late");
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let broker = InMemoryBroker::new();
        broker.fail_next_receive("orders", BrokerError::Transport("down".into()));
        let mut consumer = consumer(&broker, "orders").await;
        assert!(consumer.receive(Duration::from_millis(10)).await.is_err());
        assert!(consumer
            .receive(Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_ack_and_reject_are_recorded() {
        let broker = InMemoryBroker::new();
        let mut consumer = consumer(&broker, "orders").await;
        consumer.acknowledge(&RawMessage::new("a")).await.unwrap();
        consumer.reject(&RawMessage::new("r")).await.unwrap();
        assert_eq!(broker.acknowledged("orders")[0].body, "a");
        assert_eq!(broker.rejected("orders")[0].body, "r");
    }

    #[tokio::test]
    async fn test_offsets() {
        let broker = InMemoryBroker::new();
        for i in 0..3 {
            broker.publish("orders", RawMessage::new(i.to_string()));
        }
        let mut consumer = consumer(&broker, "orders").await;
        let offsets = consumer.offsets().unwrap();
        offsets.set_partition(4);
        offsets.set_offset(2);

        assert_eq!(broker.partition("orders"), Some(4));
        let msg = consumer.receive(Duration::from_millis(10)).await.unwrap();
        assert_eq!(msg.unwrap().body, "2");

        let plain = InMemoryBroker::new().without_offsets();
        let mut consumer = self::consumer(&plain, "orders").await;
        assert!(consumer.offsets().is_none());
    }
}
