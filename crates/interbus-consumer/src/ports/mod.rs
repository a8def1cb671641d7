//! Ports layer (Hexagonal Architecture)

pub mod inbound;
pub mod outbound;

pub use inbound::EventHandler;
pub use outbound::{
    BlobStore, BrokerContext, CoolDown, EventSink, HitStore, MessageConsumer, OffsetControl,
    SleepCoolDown, TopicHandle, WorkerQueue,
};
