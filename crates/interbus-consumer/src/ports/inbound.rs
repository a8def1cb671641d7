//! Inbound (Driving) ports.
//!
//! Application code plugs into the consumer by implementing [`EventHandler`].

use async_trait::async_trait;

use crate::domain::InboundEvent;
use crate::error::HandlerError;

/// Reacts to events rebuilt from bus messages.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError>;
}
