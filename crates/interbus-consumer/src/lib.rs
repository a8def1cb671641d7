//! # Interbus Consumer
//!
//! Consumes messages from one topic of an inter-service event bus, decides
//! whether this service should handle each one, turns it into a typed domain
//! event and hands it to local handlers, inline or through a worker queue.
//!
//! ## Pipeline
//!
//! ```text
//! broker ──receive──→ RateLimiter ──→ MessageFilter ──→ PayloadResolver ──→ EventDispatcher
//!                                         │ reject            │ skip              │ sync | async
//!                                         ↓                   ↓                   ↓
//!                                      reject()             ack()               ack()
//! ```
//!
//! | Stage | Type | Effect |
//! |-------|------|--------|
//! | Throttle | [`RateLimiter`] | At most `max` polls per decay window |
//! | Filter | [`MessageFilter`] | Too old, accepted producer, ignored producer, addressee |
//! | Resolve | [`PayloadResolver`] | Generic, serialized-event or protobuf-event payloads |
//! | Dispatch | [`EventDispatcher`] | Builds the event, runs or enqueues its handlers |
//! | Loop | [`ConsumerLoop`] | Sequences the stages; one message in flight |
//!
//! ## Failure Policy
//!
//! - Poll errors are logged and the loop keeps polling.
//! - Unknown serialized classes and protobuf names are acknowledged without dispatch.
//! - Missing offloaded payloads, undecodable bodies and sync handler failures
//!   stop the loop; the message is left neither acked nor rejected.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - brokers, blob stores, worker queue, event sink     │
//! │  control.rs, cli.rs - signals and command line                  │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - EventHandler                               │
//! │  ports/outbound.rs - BrokerContext, BlobStore, WorkerQueue, ... │
//! │  service/          - ConsumerLoop and its stages                │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/message.rs  - RawMessage and header names               │
//! │  domain/filter.rs   - MessageFilter, canonical producer ids     │
//! │  domain/payload.rs  - encodings, offload references             │
//! │  domain/registry.rs - EventRegistry of event factories          │
//! │  domain/config.rs   - ConsumerConfig, InterbusSettings          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod cli;
pub mod control;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use domain::{
    BusEvent, ConsumerConfig, DispatchMode, EventRegistry, FilterDecision, InboundEvent,
    InterbusSettings, MessageFilter, RawMessage, RunState, RunStats,
};
pub use error::{ConsumerError, EXIT_FAILURE, EXIT_INVALID, EXIT_SUCCESS};
pub use ports::{EventHandler, EventSink};
pub use service::{
    Collaborators, ConsumerLoop, EventDispatcher, IterationOutcome, PayloadResolver, RateLimiter,
};
