//! Event sink adapter publishing onto the local bus.

use std::sync::Arc;

use async_trait::async_trait;
use local_bus::{LocalEvent, LocalEventBus, LocalPublisher};

use crate::domain::RawMessage;
use crate::ports::EventSink;

/// Forwards consumer notifications to in-process subscribers.
#[derive(Clone)]
pub struct LocalBusSink {
    bus: Arc<LocalEventBus>,
}

impl LocalBusSink {
    pub fn new(bus: Arc<LocalEventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<LocalEventBus> {
        &self.bus
    }
}

#[async_trait]
impl EventSink for LocalBusSink {
    async fn message_received(&self, topic: &str, message: &RawMessage) {
        self.bus
            .publish(LocalEvent::MessageReceived {
                topic: topic.to_string(),
                message_id: message.correlation_id().map(str::to_string),
                producer: message.producer().map(str::to_string),
                headers: message.headers.clone(),
                body: message.body.clone(),
            })
            .await;
    }

    async fn event_dispatched(&self, event: &str, mode: &str, correlation_id: Option<&str>) {
        self.bus
            .publish(LocalEvent::EventDispatched {
                event: event.to_string(),
                mode: mode.to_string(),
                correlation_id: correlation_id.map(str::to_string),
            })
            .await;
    }
}

/// Sink that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

#[async_trait]
impl EventSink for NoOpSink {
    async fn message_received(&self, _topic: &str, _message: &RawMessage) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::headers;
    use local_bus::{EventFilter, LocalTopic};

    #[tokio::test]
    async fn test_message_received_is_published() {
        let bus = Arc::new(LocalEventBus::new());
        let mut sub = bus.subscribe(EventFilter::topics(vec![LocalTopic::Inbound]));
        let sink = LocalBusSink::new(bus.clone());

        let msg = RawMessage::new("{}")
            .with_header(headers::EVENT_SOURCE, "billing")
            .with_message_id("m-1");
        sink.message_received("orders", &msg).await;
        sink.event_dispatched("X", "async", None).await;

        match sub.recv().await {
            Some(LocalEvent::MessageReceived {
                topic,
                message_id,
                producer,
                ..
            }) => {
                assert_eq!(topic, "orders");
                assert_eq!(message_id.as_deref(), Some("m-1"));
                assert_eq!(producer.as_deref(), Some("billing"));
            }
            other => panic!("unexpected notification: {other:?}"),
        }
        assert_eq!(bus.published(), 2);
    }
}
