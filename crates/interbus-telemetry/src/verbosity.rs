//! Output verbosity tiers.
//!
//! The consumer reports at four tiers. Each tier is translated into an
//! `EnvFilter` directive that raises the level of the verbose target only, so
//! dependency noise stays at the base level until `Debug`.
//!
//! | Tier        | Consumer target | `<target>::body` | Everything else |
//! |-------------|-----------------|------------------|-----------------|
//! | Normal      | base            | base             | base            |
//! | Verbose     | debug           | debug            | base            |
//! | VeryVerbose | debug           | trace            | base            |
//! | Debug       | trace           | trace            | debug           |

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::TelemetryError;

/// Verbosity tier of the log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Acceptance, dispatch and lifecycle lines only.
    Normal,
    /// Adds receipt and filter rejections.
    Verbose,
    /// Adds raw message bodies.
    VeryVerbose,
    /// Everything, including poll timeouts.
    Debug,
}

impl Verbosity {
    const ALL: [Verbosity; 4] = [
        Verbosity::Normal,
        Verbosity::Verbose,
        Verbosity::VeryVerbose,
        Verbosity::Debug,
    ];

    /// Map a `-v` occurrence count to a tier.
    #[must_use]
    pub fn from_occurrences(count: u8) -> Self {
        match count {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            2 => Verbosity::VeryVerbose,
            _ => Verbosity::Debug,
        }
    }

    /// The tier after this one, wrapping back to `Normal`.
    #[must_use]
    pub fn next(self) -> Self {
        let idx = self.index();
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Filter directive for this tier.
    ///
    /// Raw message bodies are logged under `<target>::body`.
    #[must_use]
    pub fn directive(self, base_level: &str, target: &str) -> String {
        match self {
            Verbosity::Normal => base_level.to_string(),
            Verbosity::Verbose => format!("{base_level},{target}=debug"),
            Verbosity::VeryVerbose => {
                format!("{base_level},{target}=debug,{target}::{BODY_SUFFIX}=trace")
            }
            Verbosity::Debug => format!("debug,{target}=trace"),
        }
    }

    fn index(self) -> usize {
        match self {
            Verbosity::Normal => 0,
            Verbosity::Verbose => 1,
            Verbosity::VeryVerbose => 2,
            Verbosity::Debug => 3,
        }
    }

    fn from_index(idx: u8) -> Option<Self> {
        Self::ALL.get(usize::from(idx)).copied()
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verbosity::Normal => "NORMAL",
            Verbosity::Verbose => "VERBOSE",
            Verbosity::VeryVerbose => "VERY VERBOSE",
            Verbosity::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

const BODY_SUFFIX: &str = "body";

type Reloader = dyn Fn(&str) -> Result<(), TelemetryError> + Send + Sync;

/// Handle for reading and rotating the live verbosity tier.
///
/// Cloning shares the same tier. The tier is a single atomic so the handle can
/// be used from a control task without locking.
#[derive(Clone)]
pub struct VerbosityHandle {
    current: Arc<AtomicU8>,
    base_level: Arc<str>,
    target: Arc<str>,
    reloader: Option<Arc<Reloader>>,
}

impl VerbosityHandle {
    pub(crate) fn new(
        initial: Verbosity,
        base_level: &str,
        target: &str,
        reloader: Arc<Reloader>,
    ) -> Self {
        Self {
            current: Arc::new(AtomicU8::new(initial.index() as u8)),
            base_level: base_level.into(),
            target: target.into(),
            reloader: Some(reloader),
        }
    }

    /// A handle that tracks the tier without a subscriber behind it.
    #[must_use]
    pub fn detached(initial: Verbosity) -> Self {
        Self {
            current: Arc::new(AtomicU8::new(initial.index() as u8)),
            base_level: "info".into(),
            target: "interbus_consumer".into(),
            reloader: None,
        }
    }

    /// Current tier.
    ///
    /// An out-of-range stored value reads as `None`.
    #[must_use]
    pub fn current(&self) -> Option<Verbosity> {
        Verbosity::from_index(self.current.load(Ordering::Relaxed))
    }

    /// Switch to an explicit tier.
    pub fn set(&self, verbosity: Verbosity) -> Result<(), TelemetryError> {
        if let Some(reloader) = &self.reloader {
            reloader(&verbosity.directive(&self.base_level, &self.target))?;
        }
        self.current.store(verbosity.index() as u8, Ordering::Relaxed);
        Ok(())
    }

    /// Rotate to the next tier and return `(from, to)`.
    ///
    /// An unknown current tier restarts the carousel at `Normal`.
    pub fn cycle(&self) -> Result<(Option<Verbosity>, Verbosity), TelemetryError> {
        let from = self.current();
        let to = from.map_or(Verbosity::Normal, Verbosity::next);
        self.set(to)?;
        info!(
            from = %from.map_or_else(|| "UNKNOWN".to_string(), |v| v.to_string()),
            to = %to,
            "Verbosity changed"
        );
        Ok((from, to))
    }
}

impl fmt::Debug for VerbosityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerbosityHandle")
            .field("current", &self.current())
            .field("target", &self.target)
            .field("attached", &self.reloader.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::{EnvFilter, Registry};

    /// `(poll trace, body trace, consumer debug, dependency debug)` under `tier`.
    fn enabled_under(tier: Verbosity) -> (bool, bool, bool, bool) {
        let filter = EnvFilter::new(tier.directive("info", "interbus_consumer"));
        let subscriber = Registry::default().with(filter);
        tracing::subscriber::with_default(subscriber, || {
            (
                tracing::enabled!(target: "interbus_consumer::service::consumer_loop", Level::TRACE),
                tracing::enabled!(target: "interbus_consumer::body", Level::TRACE),
                tracing::enabled!(target: "interbus_consumer::service::consumer_loop", Level::DEBUG),
                tracing::enabled!(target: "hyper::client", Level::DEBUG),
            )
        })
    }

    #[test]
    fn test_carousel_order() {
        assert_eq!(Verbosity::Normal.next(), Verbosity::Verbose);
        assert_eq!(Verbosity::Verbose.next(), Verbosity::VeryVerbose);
        assert_eq!(Verbosity::VeryVerbose.next(), Verbosity::Debug);
        assert_eq!(Verbosity::Debug.next(), Verbosity::Normal);
    }

    #[test]
    fn test_from_occurrences() {
        assert_eq!(Verbosity::from_occurrences(0), Verbosity::Normal);
        assert_eq!(Verbosity::from_occurrences(2), Verbosity::VeryVerbose);
        assert_eq!(Verbosity::from_occurrences(9), Verbosity::Debug);
    }

    #[test]
    fn test_directives() {
        assert_eq!(Verbosity::Normal.directive("info", "app"), "info");
        assert_eq!(Verbosity::Verbose.directive("info", "app"), "info,app=debug");
        assert_eq!(
            Verbosity::VeryVerbose.directive("info", "app"),
            "info,app=debug,app::body=trace"
        );
        assert_eq!(Verbosity::Debug.directive("warn", "app"), "debug,app=trace");
    }

    #[test]
    fn test_tiers_enable_distinct_targets() {
        assert_eq!(enabled_under(Verbosity::Normal), (false, false, false, false));
        assert_eq!(enabled_under(Verbosity::Verbose), (false, false, true, false));
        assert_eq!(enabled_under(Verbosity::VeryVerbose), (false, true, true, false));
        assert_eq!(enabled_under(Verbosity::Debug), (true, true, true, true));
    }

    #[test]
    fn test_detached_cycle() {
        let handle = VerbosityHandle::detached(Verbosity::VeryVerbose);
        let (from, to) = handle.cycle().unwrap();
        assert_eq!(from, Some(Verbosity::VeryVerbose));
        assert_eq!(to, Verbosity::Debug);

        let (_, to) = handle.cycle().unwrap();
        assert_eq!(to, Verbosity::Normal);
    }

    #[test]
    fn test_unknown_tier_resets_to_normal() {
        let handle = VerbosityHandle::detached(Verbosity::Verbose);
        handle.current.store(42, Ordering::Relaxed);
        let (from, to) = handle.cycle().unwrap();
        assert_eq!(from, None);
        assert_eq!(to, Verbosity::Normal);
    }

    #[test]
    fn test_reloader_receives_directive() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = VerbosityHandle::new(
            Verbosity::Normal,
            "info",
            "consumer",
            Arc::new(move |directive: &str| {
                sink.lock().unwrap().push(directive.to_string());
                Ok(())
            }),
        );

        handle.cycle().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["info,consumer=debug".to_string()]);
    }

    #[test]
    fn test_failed_reload_keeps_tier() {
        let handle = VerbosityHandle::new(
            Verbosity::Normal,
            "info",
            "consumer",
            Arc::new(|_: &str| Err(TelemetryError::Reload("gone".into()))),
        );

        assert!(handle.cycle().is_err());
        assert_eq!(handle.current(), Some(Verbosity::Normal));
    }
}
