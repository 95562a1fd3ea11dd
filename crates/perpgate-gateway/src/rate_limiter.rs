//! Client-side request admission control.
//!
//! Implements an approximate token bucket that keeps the client under the
//! exchange's request-weight ceiling. The exchange's own limiter is the hard
//! boundary; on exhaustion this one sleeps a whole refill interval rather
//! than the exact residual.

use parking_lot::Mutex;
use perpgate_telemetry::Metrics;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

struct BucketState {
    tokens: u32,
    last_refill: Instant,
}

/// Token bucket rate limiter.
pub struct RateLimiter {
    /// Maximum tokens (burst size).
    capacity: u32,
    /// Time to refill from empty to full.
    interval: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a full bucket.
    ///
    /// # Arguments
    /// * `capacity` - Tokens admitted per interval
    /// * `interval` - Refill interval
    pub fn new(capacity: u32, interval: Duration) -> Self {
        Self {
            capacity,
            interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until a token is available, then consume it.
    ///
    /// Safe to call concurrently; the lock is never held across the sleep.
    pub async fn wait(&self) {
        if self.try_acquire() {
            return;
        }

        Metrics::rate_limit_wait();
        debug!(
            capacity = self.capacity,
            interval_ms = self.interval.as_millis() as u64,
            "Rate limit exhausted, sleeping one interval"
        );
        sleep(self.interval).await;

        let mut state = self.state.lock();
        // Full refill, minus the token this caller takes.
        state.tokens = self.capacity.saturating_sub(1);
        state.last_refill = Instant::now();
    }

    /// Tokens currently available (after applying elapsed-time refill).
    pub fn available(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, Instant::now());

        if state.tokens == 0 {
            return false;
        }
        state.tokens -= 1;
        true
    }

    /// Refill proportionally to elapsed time, never beyond capacity.
    ///
    /// `last_refill` only advances when at least one whole token was added,
    /// so fractional progress keeps accumulating across calls.
    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);

        if elapsed >= self.interval {
            state.tokens = self.capacity;
            state.last_refill = now;
            return;
        }

        let interval_ms = self.interval.as_millis().max(1);
        let added = elapsed.as_millis() * u128::from(self.capacity) / interval_ms;
        if added > 0 {
            let added = u32::try_from(added).unwrap_or(u32::MAX);
            state.tokens = state.tokens.saturating_add(added).min(self.capacity);
            state.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_full_interval_sleep() {
        let limiter = RateLimiter::new(5, Duration::from_millis(1000));
        let start = Instant::now();

        for _ in 0..5 {
            limiter.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available(), 0);

        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
        assert_eq!(limiter.available(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_proportional_refill() {
        let limiter = RateLimiter::new(10, Duration::from_millis(1000));
        for _ in 0..10 {
            limiter.wait().await;
        }
        assert_eq!(limiter.available(), 0);

        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(limiter.available(), 3);

        let before = Instant::now();
        limiter.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_progress_accumulates() {
        let limiter = RateLimiter::new(10, Duration::from_millis(1000));
        for _ in 0..10 {
            limiter.wait().await;
        }

        // 50ms is half a token: nothing added, refill clock not advanced.
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(limiter.available(), 0);
        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_capacity() {
        let limiter = RateLimiter::new(3, Duration::from_millis(1000));
        limiter.wait().await;
        tokio::time::advance(Duration::from_millis(5000)).await;
        assert_eq!(limiter.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_bucket() {
        let limiter = Arc::new(RateLimiter::new(4, Duration::from_millis(1000)));
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.wait().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available(), 0);
    }
}
