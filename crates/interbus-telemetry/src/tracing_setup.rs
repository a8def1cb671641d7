//! Log subscriber setup.
//!
//! Installs a `tracing-subscriber` registry whose `EnvFilter` sits behind a
//! reload layer, so the verbosity tier can be swapped at runtime.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError, VerbosityHandle};

fn build_filter(directive: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directive).map_err(|e| TelemetryError::InvalidFilter(e.to_string()))
}

/// Initialize the global log subscriber.
///
/// Returns the handle used to rotate verbosity while the process runs.
pub fn init_logging(config: &TelemetryConfig) -> Result<VerbosityHandle, TelemetryError> {
    let directive = config
        .verbosity
        .directive(&config.log_level, &config.verbose_target);
    let (filter_layer, reload_handle) = reload::Layer::new(build_filter(&directive)?);

    if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;
    }

    let reloader = Arc::new(move |directive: &str| {
        let filter = build_filter(directive)?;
        reload_handle
            .reload(filter)
            .map_err(|e| TelemetryError::Reload(e.to_string()))
    });

    tracing::info!(
        service = %config.service_name,
        verbosity = %config.verbosity,
        json = config.json_logs,
        "Logging initialized"
    );

    Ok(VerbosityHandle::new(
        config.verbosity,
        &config.log_level,
        &config.verbose_target,
        reloader,
    ))
}
