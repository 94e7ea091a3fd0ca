//! Per-indexer rate limiting.
//!
//! A fixed-window counter configured from the indexer's
//! `rate_limit_requests` / `rate_limit_window_secs`. Two acquisition
//! modes serve the two callers: the search fan-out fails fast and drops
//! the indexer rather than stalling the whole search; the download path
//! dispatches fewer, longer-lived requests and may wait for the window to
//! reset, bounded by a deadline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use foliofox_core::indexer::{Indexer, IndexerId};

/// Fixed-window request counter for one indexer.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per `window`.
    ///
    /// A zero limit or window disables limiting.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Create a limiter from an indexer's registry configuration.
    #[must_use]
    pub fn for_indexer(indexer: &Indexer) -> Self {
        Self::new(
            indexer.rate_limit_requests,
            Duration::from_secs(indexer.rate_limit_window_secs),
        )
    }

    /// Take one slot without waiting. On a saturated window returns the
    /// time until it resets.
    pub fn try_acquire(&self) -> Result<(), Duration> {
        if self.limit == 0 || self.window.is_zero() {
            return Ok(());
        }

        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let elapsed = now.duration_since(state.window_start);

        if elapsed >= self.window {
            state.window_start = now;
            state.count = 0;
        }

        if state.count < self.limit {
            state.count += 1;
            Ok(())
        } else {
            Err(self.window - elapsed)
        }
    }

    /// Take one slot, waiting for the window to reset when saturated.
    /// Gives up once `deadline` has elapsed and returns the remaining
    /// wait like `try_acquire`.
    pub async fn acquire(&self, deadline: Duration) -> Result<(), Duration> {
        let started = Instant::now();
        loop {
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(retry_after) => {
                    let remaining = deadline.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        return Err(retry_after);
                    }
                    tokio::time::sleep(retry_after.min(remaining)).await;
                }
            }
        }
    }
}

/// Shared limiters keyed by indexer id.
///
/// Both the search fan-out and the download feeder must observe the same
/// window, so limiters are created once per indexer and handed out as
/// `Arc`s.
#[derive(Default)]
pub struct RateLimiterSet {
    limiters: Mutex<HashMap<IndexerId, Arc<RateLimiter>>>,
}

impl RateLimiterSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The limiter for an indexer, created from its configuration on
    /// first use.
    pub fn limiter_for(&self, indexer: &Indexer) -> Arc<RateLimiter> {
        let mut limiters = self.limiters.lock().expect("rate limiter set poisoned");
        Arc::clone(
            limiters
                .entry(indexer.id)
                .or_insert_with(|| Arc::new(RateLimiter::for_indexer(indexer))),
        )
    }

    /// Drop an indexer's limiter so a config change takes effect.
    pub fn invalidate(&self, id: IndexerId) {
        self.limiters
            .lock()
            .expect("rate limiter set poisoned")
            .remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foliofox_core::indexer::IndexerId;

    #[test]
    fn admits_exactly_limit_per_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.try_acquire().is_ok());
        }
        let retry_after = limiter.try_acquire().unwrap_err();
        assert!(retry_after <= Duration::from_secs(60));
        assert!(retry_after > Duration::from_secs(50));
    }

    #[test]
    fn window_reset_admits_again() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_err());

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn zero_limit_disables_limiting() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(limiter.try_acquire().is_ok());
        }
    }

    #[tokio::test]
    async fn acquire_waits_for_window_reset() {
        let limiter = RateLimiter::new(1, Duration::from_millis(30));
        assert!(limiter.try_acquire().is_ok());

        // Saturated; acquire should wait out the window and succeed.
        limiter.acquire(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn acquire_gives_up_at_deadline() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire().is_ok());

        let result = limiter.acquire(Duration::from_millis(10)).await;
        assert!(result.is_err());
    }

    #[test]
    fn set_hands_out_shared_limiters() {
        let set = RateLimiterSet::new();
        let indexer =
            Indexer::new(IndexerId(1), "A", "https://a.example").with_rate_limit(1, 60);

        let first = set.limiter_for(&indexer);
        assert!(first.try_acquire().is_ok());

        // Same underlying window: the second handle sees the saturation.
        let second = set.limiter_for(&indexer);
        assert!(second.try_acquire().is_err());
    }
}
