//! Consumer configuration.
//!
//! [`InterbusSettings`] carries process-wide settings read from the
//! environment. [`ConsumerConfigBuilder`] combines them with per-run options
//! into an immutable [`ConsumerConfig`].

use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::filter::{canonical_producer_id, ProducerSet};
use super::message::parse_timestamp;
use crate::error::ConsumerError;

/// Lower bound of the poll timeout.
pub const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(200);

/// Poll timeout used when none is given.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Offset and partition to start consuming from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetSpec {
    pub offset: i64,
    pub partition: i32,
}

impl FromStr for OffsetSpec {
    type Err = String;

    /// Parse `<offset>:<partition>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (offset, partition) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <offset>:<partition>, got {s:?}"))?;
        let offset = offset
            .trim()
            .parse()
            .map_err(|e| format!("invalid offset {offset:?}: {e}"))?;
        let partition = partition
            .trim()
            .parse()
            .map_err(|e| format!("invalid partition {partition:?}: {e}"))?;
        Ok(Self { offset, partition })
    }
}

/// At most `max_attempts` polls per `decay` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Throughput {
    pub max_attempts: u32,
    pub decay: Duration,
}

impl Throughput {
    /// No throttling.
    pub const UNLIMITED: Self = Self {
        max_attempts: 0,
        decay: Duration::ZERO,
    };

    pub fn new(max_attempts: u32, decay: Duration) -> Self {
        Self {
            max_attempts,
            decay,
        }
    }

    /// Either operand being zero disables limiting.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.max_attempts == 0 || self.decay.is_zero()
    }
}

impl FromStr for Throughput {
    type Err = ConsumerError;

    /// Parse `<max>/<decay seconds>`. An empty string is unlimited.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::UNLIMITED);
        }
        let invalid = || {
            ConsumerError::Configuration(format!(
                "throughput must be <max>/<decay seconds>, got {s:?}"
            ))
        };
        let (max, decay) = s.split_once('/').ok_or_else(invalid)?;
        let max_attempts = max.trim().parse::<u32>().map_err(|_| invalid())?;
        let decay = decay.trim().parse::<u64>().map_err(|_| invalid())?;
        Ok(Self::new(max_attempts, Duration::from_secs(decay)))
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.max_attempts, self.decay.as_secs())
    }
}

/// Optional connection/queue overrides for async dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncDestination {
    pub connection: Option<String>,
    pub queue: Option<String>,
}

/// How dispatched events are executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    /// Handlers run inline; the loop waits for them.
    Sync,
    /// Jobs are enqueued for background workers.
    Async(AsyncDestination),
}

impl DispatchMode {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async(_) => "async",
        }
    }
}

impl Default for DispatchMode {
    fn default() -> Self {
        Self::Async(AsyncDestination::default())
    }
}

/// Immutable configuration of one consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topic: String,
    /// Canonical self producer id.
    pub service_id: String,
    pub offset: Option<OffsetSpec>,
    pub poll_timeout: Duration,
    pub once: bool,
    pub ignore_from: ProducerSet,
    /// Canonical ids, never containing `service_id`.
    pub accept_from: BTreeSet<String>,
    pub ignore_until: Option<DateTime<Utc>>,
    pub throughput: Throughput,
    pub mode: DispatchMode,
    /// Blob-store disk used when a message names none.
    pub offload_disk: String,
    /// Bucket used when a message names none.
    pub offload_bucket: Option<String>,
}

impl ConsumerConfig {
    pub fn builder(topic: impl Into<String>, service_id: impl Into<String>) -> ConsumerConfigBuilder {
        ConsumerConfigBuilder::new(topic, service_id)
    }

    /// Reject a configuration under which no message could be processed.
    pub fn validate(&self) -> Result<(), ConsumerError> {
        if self.accept_from.is_empty() && self.ignore_from.is_any() {
            return Err(ConsumerError::Configuration(
                "All the messages will be rejected".to_string(),
            ));
        }
        Ok(())
    }

    /// Log prefix identifying this consumer.
    #[must_use]
    pub fn consumer_id(&self) -> String {
        format!("{}:{}", self.service_id, self.topic)
    }
}

/// Builder for [`ConsumerConfig`].
///
/// Raw option values are kept as given and interpreted in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ConsumerConfigBuilder {
    topic: String,
    service_id: String,
    offset: Option<String>,
    poll_timeout_secs: Option<f64>,
    once: bool,
    ignore_from: Vec<String>,
    accept_from: Vec<String>,
    ignore_all: bool,
    ignore_own: bool,
    throughput: String,
    ignore_until: Option<String>,
    mode: DispatchMode,
    offload_disk: String,
    offload_bucket: Option<String>,
}

impl ConsumerConfigBuilder {
    pub fn new(topic: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            service_id: service_id.into(),
            offset: None,
            poll_timeout_secs: None,
            once: false,
            ignore_from: Vec::new(),
            accept_from: Vec::new(),
            ignore_all: false,
            ignore_own: false,
            throughput: String::new(),
            ignore_until: None,
            mode: DispatchMode::default(),
            offload_disk: DEFAULT_OFFLOAD_DISK.to_string(),
            offload_bucket: None,
        }
    }

    /// Apply the process-wide offload defaults.
    pub fn settings(mut self, settings: &InterbusSettings) -> Self {
        self.offload_disk = settings.offload_disk.clone();
        self.offload_bucket = Some(settings.offload_bucket.clone());
        self
    }

    pub fn offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    /// Poll timeout in seconds. Values below 0.2 are raised to 0.2; values
    /// too large for a `Duration` fail the build.
    pub fn poll_timeout_secs(mut self, secs: f64) -> Self {
        self.poll_timeout_secs = Some(secs);
        self
    }

    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn ignore_from<I, S>(mut self, producers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_from.extend(producers.into_iter().map(Into::into));
        self
    }

    pub fn accept_from<I, S>(mut self, producers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accept_from.extend(producers.into_iter().map(Into::into));
        self
    }

    pub fn ignore_all(mut self, ignore_all: bool) -> Self {
        self.ignore_all = ignore_all;
        self
    }

    pub fn ignore_own(mut self, ignore_own: bool) -> Self {
        self.ignore_own = ignore_own;
        self
    }

    pub fn throughput(mut self, throughput: impl Into<String>) -> Self {
        self.throughput = throughput.into();
        self
    }

    pub fn ignore_until(mut self, until: impl Into<String>) -> Self {
        self.ignore_until = Some(until.into());
        self
    }

    pub fn mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn offload_disk(mut self, disk: impl Into<String>) -> Self {
        self.offload_disk = disk.into();
        self
    }

    pub fn build(self) -> Result<ConsumerConfig, ConsumerError> {
        let service_id = canonical_producer_id(&self.service_id);

        let offset = self.offset.as_deref().and_then(|raw| match raw.parse() {
            Ok(spec) => Some(spec),
            Err(reason) => {
                warn!(offset = raw, %reason, "Ignoring offset: wrong format");
                None
            }
        });

        let poll_timeout = match self.poll_timeout_secs.filter(|secs| secs.is_finite()) {
            None => DEFAULT_POLL_TIMEOUT,
            Some(secs) => Duration::try_from_secs_f64(secs.max(MIN_POLL_TIMEOUT.as_secs_f64()))
                .map_err(|e| {
                    ConsumerError::Configuration(format!("poll timeout {secs}s: {e}"))
                })?,
        };

        let ignore_from = if self.ignore_all {
            ProducerSet::Any
        } else {
            let mut ids: BTreeSet<String> = self
                .ignore_from
                .iter()
                .filter(|id| !id.trim().is_empty())
                .map(|id| canonical_producer_id(id))
                .collect();
            if self.ignore_own {
                ids.insert(service_id.clone());
            }
            ProducerSet::Only(ids)
        };

        let accept_from = self
            .accept_from
            .iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| canonical_producer_id(id))
            .filter(|id| *id != service_id)
            .collect();

        let ignore_until = match self.ignore_until.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
                ConsumerError::Configuration(format!("cannot parse ignore-until {raw:?}"))
            })?),
        };

        Ok(ConsumerConfig {
            topic: self.topic,
            service_id,
            offset,
            poll_timeout,
            once: self.once,
            ignore_from,
            accept_from,
            ignore_until,
            throughput: self.throughput.parse()?,
            mode: self.mode,
            offload_disk: self.offload_disk,
            offload_bucket: self.offload_bucket,
        })
    }
}

pub const DEFAULT_SERVICE_ID: &str = "interbus";
pub const DEFAULT_GENERIC_NAMESPACE: &str = "interbus.events";
pub const DEFAULT_OFFLOAD_DISK: &str = "interbus-offloads";
pub const DEFAULT_OFFLOAD_BUCKET: &str = "heavy-payloads";

/// Transport the binary reads messages from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Newline-delimited JSON messages on standard input.
    Stdin,
    /// In-process broker, empty unless fed by the embedding code.
    Memory,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdin" => Ok(Self::Stdin),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown transport {other:?}")),
        }
    }
}

/// Process-wide settings read from the environment.
#[derive(Debug, Clone)]
pub struct InterbusSettings {
    pub service_id: String,
    pub generic_namespace: String,
    pub offload_disk: String,
    pub offload_bucket: String,
    pub offload_root: PathBuf,
    pub transport: TransportKind,
    pub async_workers: usize,
    pub registry_file: Option<PathBuf>,
    /// Wait this long between retries when throttled, instead of skipping the poll.
    pub throttle_cool_down: Option<Duration>,
}

impl Default for InterbusSettings {
    fn default() -> Self {
        Self {
            service_id: DEFAULT_SERVICE_ID.to_string(),
            generic_namespace: DEFAULT_GENERIC_NAMESPACE.to_string(),
            offload_disk: DEFAULT_OFFLOAD_DISK.to_string(),
            offload_bucket: DEFAULT_OFFLOAD_BUCKET.to_string(),
            offload_root: PathBuf::from("./storage/interbus"),
            transport: TransportKind::Stdin,
            async_workers: 1,
            registry_file: None,
            throttle_cool_down: None,
        }
    }
}

impl InterbusSettings {
    /// Read settings from the environment.
    ///
    /// # Environment Variables
    ///
    /// - `INTERBUS_SERVICE_ID` or `APP_NAME`: self producer id (default: interbus)
    /// - `INTERBUS_GENERIC_EVENT_NAMESPACE`: generic event namespace (default: interbus.events)
    /// - `INTERBUS_OFFLOAD_DISK`: default offload disk (default: interbus-offloads)
    /// - `INTERBUS_OFFLOAD_CUSTOM_BUCKET`: default offload bucket (default: heavy-payloads)
    /// - `INTERBUS_OFFLOAD_ROOT`: filesystem blob store root (default: ./storage/interbus)
    /// - `INTERBUS_TRANSPORT`: `stdin` or `memory` (default: stdin)
    /// - `INTERBUS_ASYNC_WORKERS`: background worker tasks (default: 1)
    /// - `INTERBUS_REGISTRY_FILE`: JSON list of dynamic events to register
    /// - `INTERBUS_THROTTLE_COOL_DOWN_MS`: wait and retry when throttled (default: skip)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let transport = match env::var("INTERBUS_TRANSPORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|reason: String| {
                warn!(%reason, "Falling back to stdin transport");
                TransportKind::Stdin
            }),
            Err(_) => defaults.transport,
        };

        Self {
            service_id: env::var("INTERBUS_SERVICE_ID")
                .or_else(|_| env::var("APP_NAME"))
                .unwrap_or(defaults.service_id),
            generic_namespace: env::var("INTERBUS_GENERIC_EVENT_NAMESPACE")
                .unwrap_or(defaults.generic_namespace),
            offload_disk: env::var("INTERBUS_OFFLOAD_DISK").unwrap_or(defaults.offload_disk),
            offload_bucket: env::var("INTERBUS_OFFLOAD_CUSTOM_BUCKET")
                .unwrap_or(defaults.offload_bucket),
            offload_root: env::var("INTERBUS_OFFLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.offload_root),
            transport,
            async_workers: env::var("INTERBUS_ASYNC_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.async_workers),
            registry_file: env::var("INTERBUS_REGISTRY_FILE").ok().map(PathBuf::from),
            throttle_cool_down: env::var("INTERBUS_THROTTLE_COOL_DOWN_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ConsumerConfigBuilder {
        ConsumerConfig::builder("orders", "InventoryService")
    }

    #[test]
    fn test_defaults() {
        let config = builder().build().unwrap();
        assert_eq!(config.service_id, "inventory_service");
        assert_eq!(config.poll_timeout, DEFAULT_POLL_TIMEOUT);
        assert!(config.throughput.is_unlimited());
        assert_eq!(config.mode, DispatchMode::Async(AsyncDestination::default()));
        assert_eq!(config.ignore_from, ProducerSet::none());
        assert_eq!(config.offload_disk, DEFAULT_OFFLOAD_DISK);
        assert_eq!(config.consumer_id(), "inventory_service:orders");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_timeout_is_clamped() {
        let config = builder().poll_timeout_secs(0.05).build().unwrap();
        assert_eq!(config.poll_timeout, MIN_POLL_TIMEOUT);

        let config = builder().poll_timeout_secs(0.5).build().unwrap();
        assert_eq!(config.poll_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_poll_timeout_too_large() {
        let err = builder().poll_timeout_secs(1e20).build().unwrap_err();
        assert!(matches!(err, ConsumerError::Configuration(_)));
        assert_eq!(err.exit_code(), crate::error::EXIT_INVALID);

        let config = builder().poll_timeout_secs(f64::NAN).build().unwrap();
        assert_eq!(config.poll_timeout, DEFAULT_POLL_TIMEOUT);
    }

    #[test]
    fn test_throughput_parsing() {
        assert_eq!(
            "3/10".parse::<Throughput>().unwrap(),
            Throughput::new(3, Duration::from_secs(10))
        );
        assert!("0/0".parse::<Throughput>().unwrap().is_unlimited());
        assert!("5/0".parse::<Throughput>().unwrap().is_unlimited());
        assert!("".parse::<Throughput>().unwrap().is_unlimited());
        assert!(matches!(
            "fast".parse::<Throughput>(),
            Err(ConsumerError::Configuration(_))
        ));
        assert!(builder().throughput("1/x").build().is_err());
    }

    #[test]
    fn test_bad_offset_is_ignored() {
        let config = builder().offset("42").build().unwrap();
        assert_eq!(config.offset, None);

        let config = builder().offset("42:3").build().unwrap();
        assert_eq!(
            config.offset,
            Some(OffsetSpec {
                offset: 42,
                partition: 3
            })
        );
    }

    #[test]
    fn test_ignore_own_adds_self() {
        let config = builder()
            .ignore_own(true)
            .ignore_from(["Billing", ""])
            .build()
            .unwrap();
        let ProducerSet::Only(ids) = &config.ignore_from else {
            panic!("expected explicit set");
        };
        assert!(ids.contains("inventory_service"));
        assert!(ids.contains("billing"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_accept_from_drops_self() {
        let config = builder()
            .accept_from(["inventory-service", "Billing"])
            .build()
            .unwrap();
        assert_eq!(config.accept_from.len(), 1);
        assert!(config.accept_from.contains("billing"));
    }

    #[test]
    fn test_ignore_all_without_accept_is_invalid() {
        let config = builder().ignore_all(true).build().unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INVALID);

        // accepting only self leaves the accept set empty
        let config = builder()
            .ignore_all(true)
            .accept_from(["InventoryService"])
            .build()
            .unwrap();
        assert!(config.validate().is_err());

        let config = builder()
            .ignore_all(true)
            .accept_from(["billing"])
            .build()
            .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ignore_until() {
        let config = builder().ignore_until("2024-01-01").build().unwrap();
        assert!(config.ignore_until.is_some());

        let err = builder().ignore_until("last tuesday").build().unwrap_err();
        assert!(matches!(err, ConsumerError::Configuration(_)));
    }

    #[test]
    fn test_transport_kind() {
        assert_eq!("STDIN".parse::<TransportKind>(), Ok(TransportKind::Stdin));
        assert_eq!("memory".parse::<TransportKind>(), Ok(TransportKind::Memory));
        assert!("kafka".parse::<TransportKind>().is_err());
    }
}
