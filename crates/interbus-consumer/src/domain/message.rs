//! Raw broker messages and the header vocabulary of the interbus.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Header names recognized on inbound messages.
pub mod headers {
    /// Producer id of the message.
    pub const EVENT_SOURCE: &str = "event_source";
    /// Legacy producer id alias.
    pub const SOURCE: &str = "source";
    /// Intended consumer of the message.
    pub const EVENT_ADDRESSEE: &str = "event_addressee";
    /// Payload encoding marker.
    pub const EVENT_TYPE: &str = "event_type";
    /// Class name of a serialized event.
    pub const EVENT_CLASS: &str = "event_class";
    /// Name of a generic or protobuf event.
    pub const EVENT: &str = "event";
    /// Correlation id fallback when the broker carries no message id.
    pub const EVENT_ID: &str = "event_id";
    /// Timestamp fallback when the broker carries no timestamp.
    pub const EVENT_TIME: &str = "event_time";
    /// Hash of an offloaded heavy payload.
    pub const EVENT_HEAVY_PAYLOAD_HASH: &str = "event_heavy_payload_hash";
    pub const EVENT_HEAVY_PAYLOAD_DISK: &str = "event_heavy_payload_disk";
    pub const EVENT_HEAVY_PAYLOAD_BUCKET: &str = "event_heavy_payload_bucket";
    /// Legacy alias of [`EVENT_HEAVY_PAYLOAD_BUCKET`].
    pub const EVENT_CUSTOM_BUCKET: &str = "event_custom_bucket";
    /// Truthy when the offloaded payload is zlib-compressed.
    pub const EVENT_COMPRESS: &str = "event_compress";
    /// Reply destination fallback when the broker carries none.
    pub const REPLY_TOPIC: &str = "reply_topic";
}

/// A message as delivered by the broker, before any interpretation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// String headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Opaque body.
    #[serde(default)]
    pub body: String,
    /// Broker message id.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Broker timestamp.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Broker reply destination.
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl RawMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Producer id, read from `event_source` then `source`.
    pub fn producer(&self) -> Option<&str> {
        self.header(headers::EVENT_SOURCE)
            .or_else(|| self.header(headers::SOURCE))
    }

    pub fn addressee(&self) -> Option<&str> {
        self.header(headers::EVENT_ADDRESSEE)
    }

    /// Broker message id, or the `event_id` header.
    pub fn correlation_id(&self) -> Option<&str> {
        self.message_id
            .as_deref()
            .or_else(|| self.header(headers::EVENT_ID))
    }

    /// Broker reply destination, or the `reply_topic` header.
    pub fn reply_destination(&self) -> Option<&str> {
        self.reply_to
            .as_deref()
            .or_else(|| self.header(headers::REPLY_TOPIC))
    }

    /// Broker timestamp, or the parsed `event_time` header.
    pub fn effective_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .or_else(|| self.header(headers::EVENT_TIME).and_then(parse_timestamp))
    }
}

/// Parse a point in time.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` (midnight UTC) and
/// unix seconds. Naive values are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_falls_back_to_legacy_header() {
        let msg = RawMessage::new("{}").with_header(headers::SOURCE, "billing");
        assert_eq!(msg.producer(), Some("billing"));

        let msg = msg.with_header(headers::EVENT_SOURCE, "orders");
        assert_eq!(msg.producer(), Some("orders"));
    }

    #[test]
    fn test_correlation_id_fallback() {
        let msg = RawMessage::new("{}").with_header(headers::EVENT_ID, "evt-1");
        assert_eq!(msg.correlation_id(), Some("evt-1"));
        assert_eq!(msg.with_message_id("m-1").correlation_id(), Some("m-1"));
    }

    #[test]
    fn test_reply_destination_fallback() {
        let msg = RawMessage::new("{}").with_header(headers::REPLY_TOPIC, "replies");
        assert_eq!(msg.reply_destination(), Some("replies"));
        assert_eq!(
            msg.with_reply_to("direct").reply_destination(),
            Some("direct")
        );
    }

    #[test]
    fn test_timestamp_from_event_time_header() {
        let msg = RawMessage::new("{}").with_header(headers::EVENT_TIME, "2024-03-01 10:00:00");
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(msg.effective_timestamp(), Some(expected));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let midnight = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-03-01"), Some(midnight));
        assert_eq!(parse_timestamp("2024-03-01T00:00:00Z"), Some(midnight));
        assert_eq!(parse_timestamp("2024-03-01T02:00:00+02:00"), Some(midnight));
        assert_eq!(
            parse_timestamp(&midnight.timestamp().to_string()),
            Some(midnight)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_deserialize_minimal_line() {
        let msg: RawMessage = serde_json::from_str(r#"{"body":"hi"}"#).unwrap();
        assert_eq!(msg.body, "hi");
        assert!(msg.headers.is_empty());
        assert!(msg.timestamp.is_none());
    }
}
