use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Enforces a minimum interval between consecutive permitted requests,
/// shared by every worker that talks to the same upstream.
///
/// Each caller reserves the next free slot under a short lock and then sleeps
/// until that slot outside the lock, so concurrent callers are granted in the
/// order they reserved and never closer together than `interval`.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_granted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_granted: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Suspends until at least `interval` has elapsed since the previously
    /// granted request. The first request after construction or
    /// [`reset`](Self::reset) proceeds immediately.
    pub async fn wait(&self) {
        let slot = {
            let mut last = self
                .last_granted
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let slot = match *last {
                Some(prev) => (prev + self.interval).max(now),
                None => now,
            };
            *last = Some(slot);
            slot
        };
        sleep_until(slot).await;
    }

    /// Forgets the last grant; the next [`wait`](Self::wait) returns at once.
    pub fn reset(&self) {
        let mut last = self
            .last_granted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = None;
    }
}
