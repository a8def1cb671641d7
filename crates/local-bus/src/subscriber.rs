//! # Listening
//!
//! A [`Subscription`] sees every notification published after it was
//! created, narrowed by its [`EventFilter`]. Listeners that fall more than
//! the channel capacity behind skip ahead instead of failing.

use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::warn;

use crate::events::{EventFilter, LocalEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Local bus closed")]
    Closed,
}

/// Pull-based handle onto the local bus.
pub struct Subscription {
    receiver: broadcast::Receiver<LocalEvent>,
    filter: EventFilter,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<LocalEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Wait for the next matching notification. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<LocalEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn_lagged(missed),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching notification if one is already buffered.
    pub fn try_recv(&mut self) -> Result<Option<LocalEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => warn_lagged(missed),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Turn this subscription into a [`Stream`].
    #[must_use]
    pub fn into_stream(self) -> EventStream {
        EventStream {
            inner: BroadcastStream::new(self.receiver),
            filter: self.filter,
        }
    }
}

fn warn_lagged(missed: u64) {
    warn!(missed, "Local listener lagged behind, notifications skipped");
}

/// Filtered notification stream; ends when the bus is dropped.
pub struct EventStream {
    inner: BroadcastStream<LocalEvent>,
    filter: EventFilter,
}

impl EventStream {
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Stream for EventStream {
    type Item = LocalEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) if self.filter.matches(&event) => {
                    return Poll::Ready(Some(event))
                }
                Poll::Ready(Some(Ok(_))) => {}
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(missed)))) => {
                    warn_lagged(missed);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{dispatched, received, LocalTopic};
    use crate::publisher::LocalEventBus;
    use crate::LocalPublisher;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_recv_skips_filtered_topics() {
        let bus = LocalEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![LocalTopic::Dispatch]));

        bus.publish(received("orders")).await;
        bus.publish(dispatched()).await;

        let got = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");
        assert!(matches!(got, LocalEvent::EventDispatched { .. }));
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_bus_drop() {
        let bus = LocalEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        drop(bus);

        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_try_recv_states() {
        let bus = LocalEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        assert_eq!(sub.try_recv(), Ok(None));

        bus.publish(received("orders")).await;
        assert!(matches!(
            sub.try_recv(),
            Ok(Some(LocalEvent::MessageReceived { .. }))
        ));

        drop(bus);
        assert_eq!(sub.try_recv(), Err(SubscriptionError::Closed));
    }

    #[tokio::test]
    async fn test_lagging_listener_keeps_newest() {
        let bus = LocalEventBus::with_capacity(2);
        let mut sub = bus.subscribe(EventFilter::from_source_topics(vec!["t3".to_string()]));

        for topic in ["t1", "t2", "t3"] {
            bus.publish(received(topic)).await;
        }

        let got = sub.try_recv().unwrap().unwrap();
        assert_eq!(got.source_topic(), Some("t3"));
    }

    #[tokio::test]
    async fn test_stream_yields_matching_then_ends() {
        let bus = LocalEventBus::new();
        let mut stream = bus
            .subscribe(EventFilter::topics(vec![LocalTopic::Inbound]))
            .into_stream();

        bus.publish(dispatched()).await;
        bus.publish(received("orders")).await;
        drop(bus);

        let first = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(first.source_topic(), Some("orders"));
        assert_eq!(stream.next().await, None);
    }
}
