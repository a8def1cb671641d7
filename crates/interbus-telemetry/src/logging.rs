//! Structured log helpers.
//!
//! Every per-message log line carries the same identifying fields so that a
//! message can be followed from receipt to acknowledgement:
//! - `message_id`: broker message id (or the `event_id` header)
//! - `timestamp`: message time as reported by the producer
//! - Additional context fields

/// Log a message-related event with standard fields.
///
/// Missing ids and timestamps are rendered as `-`.
#[macro_export]
macro_rules! log_message_event {
    ($level:ident, $msg:expr, $message_id:expr, $timestamp:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            message_id = $message_id.unwrap_or("-"),
            timestamp = %$timestamp
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string()),
            $($($field)*,)?
            $msg
        )
    };
}
