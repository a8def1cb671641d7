//! # Interbus Telemetry
//!
//! Structured logging for the interbus consumer.
//!
//! ## Components
//!
//! - **Config**: environment-driven settings (`TelemetryConfig::from_env`)
//! - **Subscriber**: `tracing-subscriber` registry with a reloadable `EnvFilter`
//! - **Verbosity**: four output tiers that can be rotated while the process runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use interbus_telemetry::{init_logging, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! let verbosity = init_logging(&config)?;
//!
//! // later, from a control channel
//! let (from, to) = verbosity.cycle()?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `INTERBUS_LOG_LEVEL` / `RUST_LOG` | `info` | Base log level filter |
//! | `INTERBUS_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `INTERBUS_SERVICE_ID` | `interbus` | Service name attached to log lines |

mod config;
mod logging;
mod tracing_setup;
mod verbosity;

pub use config::TelemetryConfig;
pub use tracing_setup::init_logging;
pub use verbosity::{Verbosity, VerbosityHandle};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize log subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid log filter directive: {0}")]
    InvalidFilter(String),

    #[error("Failed to reload log filter: {0}")]
    Reload(String),
}

/// Convenience macro for creating a span carrying the consumer identity.
///
/// # Example
///
/// ```rust,ignore
/// use interbus_telemetry::consumer_span;
///
/// let span = consumer_span!("consume", consumer = "billing:orders");
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! consumer_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "interbus");
        assert_eq!(config.verbosity, Verbosity::Normal);
    }
}
