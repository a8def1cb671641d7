//! # Local Events
//!
//! Notifications raised by the consumer for in-process listeners.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All notifications that can be published on the local bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocalEvent {
    /// A message passed filtering and is about to be resolved and dispatched.
    ///
    /// Raised for every accepted message regardless of dispatch mode.
    MessageReceived {
        /// Topic the message was read from.
        topic: String,
        /// Broker message id or `event_id` header.
        message_id: Option<String>,
        /// Producer id as carried on the message.
        producer: Option<String>,
        /// Raw message headers.
        headers: BTreeMap<String, String>,
        /// Raw message body.
        body: String,
    },

    /// A domain event was handed to the handler pipeline or the worker queue.
    EventDispatched {
        /// Registry key of the dispatched event.
        event: String,
        /// `sync` or `async`.
        mode: String,
        /// Correlation id attached to the event.
        correlation_id: Option<String>,
    },
}

impl LocalEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> LocalTopic {
        match self {
            Self::MessageReceived { .. } => LocalTopic::Inbound,
            Self::EventDispatched { .. } => LocalTopic::Dispatch,
        }
    }

    /// Get the interbus topic the notification relates to, if known.
    #[must_use]
    pub fn source_topic(&self) -> Option<&str> {
        match self {
            Self::MessageReceived { topic, .. } => Some(topic),
            Self::EventDispatched { .. } => None,
        }
    }
}

/// Local topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalTopic {
    /// Message receipt notifications.
    Inbound,
    /// Dispatch notifications.
    Dispatch,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific notifications.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<LocalTopic>,
    /// Interbus topics to include. Empty means all.
    pub source_topics: Vec<String>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<LocalTopic>) -> Self {
        Self {
            topics,
            source_topics: Vec::new(),
        }
    }

    /// Create a filter for notifications about specific interbus topics.
    #[must_use]
    pub fn from_source_topics(source_topics: Vec<String>) -> Self {
        Self {
            topics: Vec::new(),
            source_topics,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &LocalEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&LocalTopic::All)
            || self.topics.contains(&event.topic());

        let source_match = self.source_topics.is_empty()
            || event
                .source_topic()
                .is_some_and(|t| self.source_topics.iter().any(|s| s == t));

        topic_match && source_match
    }
}

#[cfg(test)]
pub(crate) fn received(topic: &str) -> LocalEvent {
    LocalEvent::MessageReceived {
        topic: topic.to_string(),
        message_id: Some("m-1".to_string()),
        producer: Some("billing".to_string()),
        headers: BTreeMap::new(),
        body: "{}".to_string(),
    }
}

#[cfg(test)]
pub(crate) fn dispatched() -> LocalEvent {
    LocalEvent::EventDispatched {
        event: "OrderPlaced".to_string(),
        mode: "sync".to_string(),
        correlation_id: None,
    }
}
