//! Error types for the interbus consumer

use thiserror::Error;

/// Process exit code for a graceful stop.
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code for a message failure that halted the loop.
pub const EXIT_FAILURE: u8 = 1;
/// Process exit code for a configuration that can never process a message.
pub const EXIT_INVALID: u8 = 2;

/// Errors that can stop the consumer loop or fail a single message.
///
/// An unrecognized event type is not an error; it surfaces as
/// `Resolution::Skip` and the message is acknowledged.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("Transient poll error: {0}")]
    TransientPoll(#[source] BrokerError),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Payload hash \"{hash}\" not found")]
    OffloadedPayloadNotFound {
        hash: String,
        #[source]
        source: BlobStoreError,
    },

    #[error("Failed to decode payload for {target}: {reason}")]
    PayloadDecode { target: String, reason: String },

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl ConsumerError {
    /// Exit code the process should terminate with for this error.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => EXIT_INVALID,
            _ => EXIT_FAILURE,
        }
    }
}

/// Errors reported by a broker driver.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed message: {0}")]
    Decode(String),

    #[error("Consumer already created for topic {0}")]
    ConsumerTaken(String),

    #[error("Connection closed")]
    Closed,
}

/// Errors from the offloaded-payload blob store.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("Blob {key} not found on disk {disk}")]
    NotFound { disk: String, key: String },

    #[error("Blob store backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from building or dispatching a domain event.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Cannot build event {event}: {reason}")]
    Build { event: String, reason: String },

    #[error("Handler failed for {event}: {source}")]
    Handler {
        event: String,
        #[source]
        source: HandlerError,
    },

    #[error("Worker queue closed")]
    QueueClosed,
}

/// Failure raised by an event handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Unexpected event payload: {0}")]
    UnexpectedPayload(String),
}
