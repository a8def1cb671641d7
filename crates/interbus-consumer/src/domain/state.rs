//! Counters and the stop flag shared between the loop and the control task.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// Lifetime state of one consumer loop.
///
/// Every field is a single atomic so the control task can read or flip it at
/// any point without locking.
#[derive(Debug)]
pub struct RunState {
    should_stop: AtomicBool,
    consumed: AtomicU64,
    ignored: AtomicU64,
    started_at: DateTime<Utc>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub consumed: u64,
    pub ignored: u64,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            should_stop: AtomicBool::new(false),
            consumed: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::SeqCst)
    }

    pub fn record_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            consumed: self.consumed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let state = RunState::new();
        state.record_consumed();
        state.record_consumed();
        state.record_ignored();

        let stats = state.stats();
        assert_eq!(stats.consumed, 2);
        assert_eq!(stats.ignored, 1);
    }

    #[test]
    fn test_stop_flag() {
        let state = RunState::default();
        assert!(!state.should_stop());
        state.request_stop();
        assert!(state.should_stop());
    }
}
