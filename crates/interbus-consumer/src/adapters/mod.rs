//! Adapters layer: implementations of the outbound ports.

pub mod blob_store;
pub mod event_sink;
pub mod hit_store;
pub mod json_lines;
pub mod memory_broker;
pub mod worker_queue;

pub use blob_store::{FsBlobStore, InMemoryBlobStore};
pub use event_sink::{LocalBusSink, NoOpSink};
pub use hit_store::InMemoryHitStore;
pub use json_lines::JsonLinesBroker;
pub use memory_broker::InMemoryBroker;
pub use worker_queue::{HandlerPipeline, LocalWorkerQueue, LoggingHandler, WorkerPool};
