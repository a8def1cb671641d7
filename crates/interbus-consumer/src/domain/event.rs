//! Domain events rebuilt from inbound messages.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::config::AsyncDestination;
use super::payload::TargetKind;

/// A typed event that can be rebuilt from a bus message.
///
/// The correlation and reply slots are optional capabilities: an event that
/// carries them overrides the setters and returns `true`.
pub trait BusEvent: Send + Sync + fmt::Debug + 'static {
    /// Registry key or logical name of the event.
    fn event_name(&self) -> &str;

    /// Store the correlation id. Returns `false` if the event has no slot.
    fn set_correlation_id(&mut self, _id: &str) -> bool {
        false
    }

    /// Store the reply destination. Returns `false` if the event has no slot.
    fn set_reply_to(&mut self, _reply_to: Option<&str>) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// An event as handed to the handler pipeline.
#[derive(Debug)]
pub struct InboundEvent {
    event: Box<dyn BusEvent>,
    key: String,
    kind: TargetKind,
    correlation_id: Option<String>,
    reply_to: Option<String>,
    prevent_rebroadcast: bool,
}

impl InboundEvent {
    pub fn new(event: Box<dyn BusEvent>, key: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            event,
            key: key.into(),
            kind,
            correlation_id: None,
            reply_to: None,
            prevent_rebroadcast: false,
        }
    }

    #[must_use]
    pub fn with_correlation(mut self, correlation_id: Option<String>, reply_to: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self.reply_to = reply_to;
        self
    }

    /// Flag the event as received over the bus so it is never published back.
    #[must_use]
    pub fn received_over_bus(mut self) -> Self {
        self.prevent_rebroadcast = true;
        self
    }

    pub fn event(&self) -> &dyn BusEvent {
        self.event.as_ref()
    }

    pub fn downcast_ref<E: BusEvent>(&self) -> Option<&E> {
        self.event.as_any().downcast_ref::<E>()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    pub fn prevents_rebroadcast(&self) -> bool {
        self.prevent_rebroadcast
    }
}

/// Generic message whose event name matches no registered type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrecognizedEvent {
    /// Value of the `event` header.
    pub name: String,
    pub headers: BTreeMap<String, String>,
    /// Decoded body, or the raw body as a string.
    pub payload: Value,
}

impl UnrecognizedEvent {
    /// Rebuild from the `headers`/`payload` field map of a fallback payload.
    pub fn from_fields(name: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        let headers = match fields.remove("headers") {
            Some(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| match v {
                    Value::String(s) => Some((k, s)),
                    _ => None,
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        Self {
            name: name.into(),
            headers,
            payload: fields.remove("payload").unwrap_or(Value::Null),
        }
    }
}

impl BusEvent for UnrecognizedEvent {
    fn event_name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Field-map backed event for types declared only by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicEvent {
    pub name: String,
    pub fields: Map<String, Value>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
}

impl DynamicEvent {
    pub fn new(name: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            fields,
            correlation_id: None,
            reply_to: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl BusEvent for DynamicEvent {
    fn event_name(&self) -> &str {
        &self.name
    }

    fn set_correlation_id(&mut self, id: &str) -> bool {
        self.correlation_id = Some(id.to_string());
        true
    }

    fn set_reply_to(&mut self, reply_to: Option<&str>) -> bool {
        self.reply_to = reply_to.map(str::to_string);
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Unit of work handed to the worker queue.
#[derive(Debug)]
pub struct DispatchJob {
    pub id: Uuid,
    pub event: InboundEvent,
    pub destination: AsyncDestination,
    pub created_at: DateTime<Utc>,
}

impl DispatchJob {
    pub fn new(event: InboundEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            destination: AsyncDestination::default(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn on_destination(mut self, destination: AsyncDestination) -> Self {
        self.destination = destination;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_event_slots() {
        let mut event = DynamicEvent::new("OrderPlaced", Map::new());
        assert!(event.set_correlation_id("m-1"));
        assert!(event.set_reply_to(Some("replies")));
        assert_eq!(event.correlation_id.as_deref(), Some("m-1"));
        assert_eq!(event.reply_to.as_deref(), Some("replies"));

        assert!(event.set_reply_to(None));
        assert_eq!(event.reply_to, None);
    }

    #[test]
    fn test_unrecognized_event_has_no_slots() {
        let mut event = UnrecognizedEvent {
            name: "ping".into(),
            headers: BTreeMap::new(),
            payload: Value::Null,
        };
        assert!(!event.set_correlation_id("m-1"));
        assert!(!event.set_reply_to(Some("x")));
    }

    #[test]
    fn test_unrecognized_from_fields() {
        let fields: Map<String, Value> = serde_json::from_str(
            r#"{"headers":{"event":"ping","n":1},"payload":"raw"}"#,
        )
        .unwrap();
        let event = UnrecognizedEvent::from_fields("ping", fields);
        assert_eq!(event.headers.get("event").map(String::as_str), Some("ping"));
        assert!(!event.headers.contains_key("n"));
        assert_eq!(event.payload, Value::String("raw".into()));
    }

    #[test]
    fn test_inbound_event_downcast() {
        let inbound = InboundEvent::new(
            Box::new(DynamicEvent::new("OrderPlaced", Map::new())),
            "OrderPlaced",
            TargetKind::Serialized,
        )
        .received_over_bus();

        assert!(inbound.prevents_rebroadcast());
        assert_eq!(inbound.event().event_name(), "OrderPlaced");
        assert!(inbound.downcast_ref::<DynamicEvent>().is_some());
        assert!(inbound.downcast_ref::<UnrecognizedEvent>().is_none());
    }

    #[test]
    fn test_job_destination() {
        let inbound = InboundEvent::new(
            Box::new(DynamicEvent::new("A", Map::new())),
            "A",
            TargetKind::Generic,
        );
        let job = DispatchJob::new(inbound).on_destination(AsyncDestination {
            connection: Some("redis".into()),
            queue: None,
        });
        assert_eq!(job.destination.connection.as_deref(), Some("redis"));
    }
}
