//! Telemetry configuration from environment variables.

use std::env;

use crate::Verbosity;

/// Configuration for log output.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Base log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Tracing target whose output grows with the verbosity tier
    pub verbose_target: String,

    /// Initial verbosity tier
    pub verbosity: Verbosity,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "interbus".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            verbose_target: "interbus_consumer".to_string(),
            verbosity: Verbosity::Normal,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `INTERBUS_SERVICE_ID` or `APP_NAME`: Service name (default: interbus)
    /// - `INTERBUS_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `INTERBUS_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("INTERBUS_SERVICE_ID")
                .or_else(|_| env::var("APP_NAME"))
                .unwrap_or_else(|_| "interbus".to_string()),

            log_level: env::var("INTERBUS_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("INTERBUS_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            ..Self::default()
        }
    }

    /// Override the initial verbosity tier.
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert_eq!(config.verbose_target, "interbus_consumer");
    }

    #[test]
    fn test_with_verbosity() {
        let config = TelemetryConfig::default().with_verbosity(Verbosity::Debug);
        assert_eq!(config.verbosity, Verbosity::Debug);
    }
}
