//! Domain layer: pure types and decisions, no I/O.

pub mod config;
pub mod event;
pub mod filter;
pub mod message;
pub mod payload;
pub mod registry;
pub mod state;

pub use config::{
    AsyncDestination, ConsumerConfig, ConsumerConfigBuilder, DispatchMode, InterbusSettings,
    OffsetSpec, Throughput, TransportKind,
};
pub use event::{BusEvent, DispatchJob, DynamicEvent, InboundEvent, UnrecognizedEvent};
pub use filter::{canonical_producer_id, FilterDecision, MessageFilter, ProducerSet};
pub use message::{headers, parse_timestamp, RawMessage};
pub use payload::{
    Encoding, OffloadReference, Resolution, ResolvedPayload, SkipReason, TargetKind,
    PB_EVENT_MARKER, SERIALIZED_EVENT_MARKER,
};
pub use registry::{studly_case, EventFactory, EventRegistry, RegistryDescriptor};
pub use state::{RunState, RunStats};
