//! In-process fixed-window hit counter.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::ports::HitStore;

#[derive(Debug, Clone, Copy)]
struct Window {
    hits: u64,
    expires_at: Instant,
}

/// [`HitStore`] keeping one fixed window per key in memory.
///
/// The window opens on the first hit and lasts for the decay given with that
/// hit; later hits inside the window do not extend it.
#[derive(Debug, Default)]
pub struct InMemoryHitStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl InMemoryHitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the window of `key`.
    pub fn clear(&self, key: &str) {
        self.windows.lock().remove(key);
    }
}

impl HitStore for InMemoryHitStore {
    fn attempts(&self, key: &str) -> u64 {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        match windows.get(key) {
            Some(window) if window.expires_at > now => window.hits,
            Some(_) => {
                windows.remove(key);
                0
            }
            None => 0,
        }
    }

    fn hit(&self, key: &str, decay: Duration) -> u64 {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        let window = windows.entry(key.to_string()).or_insert(Window {
            hits: 0,
            expires_at: now + decay,
        });
        if window.expires_at <= now {
            *window = Window {
                hits: 0,
                expires_at: now + decay,
            };
        }
        window.hits += 1;
        window.hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hits_accumulate_in_window() {
        let store = InMemoryHitStore::new();
        assert_eq!(store.attempts("hits:orders"), 0);
        assert_eq!(store.hit("hits:orders", Duration::from_secs(60)), 1);
        assert_eq!(store.hit("hits:orders", Duration::from_secs(60)), 2);
        assert_eq!(store.attempts("hits:orders"), 2);
        assert_eq!(store.attempts("hits:other"), 0);
    }

    #[test]
    fn test_window_expires() {
        let store = InMemoryHitStore::new();
        store.hit("k", Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(store.attempts("k"), 0);
        assert_eq!(store.hit("k", Duration::from_millis(20)), 1);
    }

    #[test]
    fn test_clear() {
        let store = InMemoryHitStore::new();
        store.hit("k", Duration::from_secs(60));
        store.clear("k");
        assert_eq!(store.attempts("k"), 0);
    }
}
