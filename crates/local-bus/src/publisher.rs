//! # Publishing
//!
//! [`LocalEventBus`] fans notifications out over a `tokio` broadcast channel.
//! A notification published while nobody listens is counted and dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use crate::events::{EventFilter, LocalEvent};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Publishing side of the local bus.
#[async_trait]
pub trait LocalPublisher: Send + Sync {
    /// Returns how many listeners were attached when `event` was sent.
    async fn publish(&self, event: LocalEvent) -> usize;

    /// Notifications published so far, delivered or not.
    fn published(&self) -> u64;
}

pub struct LocalEventBus {
    sender: broadcast::Sender<LocalEvent>,
    published: AtomicU64,
}

impl LocalEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds how far a listener may lag before it skips ahead.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        trace!(topics = ?filter.topics, sources = ?filter.source_topics, "Local listener attached");
        Subscription::new(self.sender.subscribe(), filter)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalPublisher for LocalEventBus {
    async fn publish(&self, event: LocalEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();
        let listeners = self.sender.send(event).unwrap_or(0);
        trace!(?topic, listeners, "Local notification published");
        listeners
    }

    fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
