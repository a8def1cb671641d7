//! Outbound (Driven) ports of the consumer.
//!
//! These traits describe the external systems the loop drives: the broker,
//! the offloaded-payload blob store, the worker queue, the local event sink
//! and the rate-limiter hit counter.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DispatchJob, RawMessage};
use crate::error::{BlobStoreError, BrokerError, DispatchError};

/// Handle to a broker topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    pub name: String,
}

/// Broker connection able to open topics and consumers.
#[async_trait]
pub trait BrokerContext: Send + Sync {
    fn create_topic(&self, name: &str) -> Result<TopicHandle, BrokerError>;

    async fn create_consumer(
        &self,
        topic: &TopicHandle,
    ) -> Result<Box<dyn MessageConsumer>, BrokerError>;
}

/// A consumer bound to one topic.
#[async_trait]
pub trait MessageConsumer: Send {
    /// Wait up to `timeout` for the next message. `Ok(None)` on timeout.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<RawMessage>, BrokerError>;

    async fn acknowledge(&mut self, message: &RawMessage) -> Result<(), BrokerError>;

    async fn reject(&mut self, message: &RawMessage) -> Result<(), BrokerError>;

    /// Offset control, if the driver supports it.
    fn offsets(&mut self) -> Option<&mut dyn OffsetControl> {
        None
    }
}

/// Optional capability of consumers that can seek.
pub trait OffsetControl: Send {
    fn set_partition(&mut self, partition: i32);
    fn set_offset(&mut self, offset: i64);
}

/// Read-only access to offloaded payloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch `key` from `bucket` on `disk`. `None` selects the disk's own bucket.
    async fn get(&self, disk: &str, bucket: Option<&str>, key: &str)
        -> Result<Vec<u8>, BlobStoreError>;
}

/// Executes dispatch jobs.
#[async_trait]
pub trait WorkerQueue: Send + Sync {
    /// Hand the job to background workers and return once it is queued.
    async fn enqueue(&self, job: DispatchJob) -> Result<(), DispatchError>;

    /// Run the job's handlers now and wait for them.
    async fn dispatch_inline(&self, job: DispatchJob) -> Result<(), DispatchError>;
}

/// In-process notifications about consumed messages.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// A message passed filtering. Fired before resolution in every mode.
    async fn message_received(&self, topic: &str, message: &RawMessage);

    /// A domain event was dispatched.
    async fn event_dispatched(&self, _event: &str, _mode: &str, _correlation_id: Option<&str>) {}
}

/// Counter store backing the rate limiter.
///
/// Implementations may be shared across processes; counts are approximate.
pub trait HitStore: Send + Sync {
    /// Hits recorded for `key` in its current window.
    fn attempts(&self, key: &str) -> u64;

    /// Record a hit. A new window of length `decay` opens on the first hit.
    fn hit(&self, key: &str, decay: Duration) -> u64;
}

/// Back-off invoked while the rate limiter denies execution.
#[async_trait]
pub trait CoolDown: Send + Sync {
    async fn cool_down(&self);
}

/// Sleeps for a fixed period.
#[derive(Debug, Clone, Copy)]
pub struct SleepCoolDown(pub Duration);

#[async_trait]
impl CoolDown for SleepCoolDown {
    async fn cool_down(&self) {
        tokio::time::sleep(self.0).await;
    }
}
