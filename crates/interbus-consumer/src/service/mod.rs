//! Service layer: the consumption pipeline wired over the ports.

pub mod consumer_loop;
pub mod dispatcher;
pub mod rate_limiter;
pub mod resolver;

pub use consumer_loop::{Collaborators, ConsumerLoop, IterationOutcome, LoopState};
pub use dispatcher::{DispatchOutcome, EventDispatcher, OriginCache};
pub use rate_limiter::{RateLimiter, Throttled};
pub use resolver::PayloadResolver;
