//! Throttling of the poll operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use crate::domain::Throughput;
use crate::ports::{CoolDown, HitStore};

/// Result of a rate-limited call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Throttled<T> {
    Ran(T),
    /// Denied and no cool-down was configured; the operation did not run.
    Skipped,
}

/// Allows at most `max_attempts` runs per decay window.
///
/// The counter lives in a [`HitStore`] under `hits:<name>`.
pub struct RateLimiter {
    key: String,
    throughput: Throughput,
    store: Arc<dyn HitStore>,
    cool_down: Option<Arc<dyn CoolDown>>,
}

impl RateLimiter {
    pub fn new(name: &str, throughput: Throughput, store: Arc<dyn HitStore>) -> Self {
        Self {
            key: format!("hits:{name}"),
            throughput,
            store,
            cool_down: None,
        }
    }

    /// Wait with `cool_down` instead of skipping when denied.
    #[must_use]
    pub fn with_cool_down(mut self, cool_down: Arc<dyn CoolDown>) -> Self {
        self.cool_down = Some(cool_down);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn too_many_attempts(&self) -> bool {
        self.store.attempts(&self.key) >= u64::from(self.throughput.max_attempts)
    }

    /// Await `op` if the window allows it. A skipped `op` is dropped unpolled.
    ///
    /// The hit is recorded after `op` completes, whatever it returns.
    pub async fn attempt<Fut, T>(&self, op: Fut) -> Throttled<T>
    where
        Fut: Future<Output = T>,
    {
        if self.throughput.is_unlimited() {
            return Throttled::Ran(op.await);
        }

        if self.too_many_attempts() {
            let Some(cool_down) = &self.cool_down else {
                trace!(key = %self.key, "Rate limit reached, skipping");
                return Throttled::Skipped;
            };
            loop {
                cool_down.cool_down().await;
                if !self.too_many_attempts() {
                    break;
                }
            }
        }

        let _hit = HitGuard {
            store: self.store.as_ref(),
            key: &self.key,
            decay: self.throughput.decay,
        };
        Throttled::Ran(op.await)
    }
}

struct HitGuard<'a> {
    store: &'a dyn HitStore,
    key: &'a str,
    decay: Duration,
}

impl Drop for HitGuard<'_> {
    fn drop(&mut self) {
        self.store.hit(self.key, self.decay);
    }
}
