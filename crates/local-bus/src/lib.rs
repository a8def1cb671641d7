//! # Local Bus - In-Process Event Notifications
//!
//! Broadcasts notifications about inbound interbus traffic to listeners that
//! live in the same process as the consumer.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Consumer    │                    │  Listener    │
//! │    loop      │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Local Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Publishing never blocks and never fails: with no listener attached the
//! notification is dropped.

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{EventFilter, LocalEvent, LocalTopic};
pub use publisher::{LocalEventBus, LocalPublisher};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Notifications buffered per listener before it starts skipping.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
