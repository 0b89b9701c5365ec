//! Smooth crawl rate limiting.
//!
//! A token bucket with capacity 1: tokens refill at `rate` per second but
//! never accumulate past a single token, so a long idle period is followed
//! by at most one immediate request instead of a burst. In steady state the
//! bucket admits one caller per `1/rate` seconds.
//!
//! The limiter is instance-based for test isolation; the orchestrator owns
//! one per crawl.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Token bucket state. `tokens` is in the range `0.0..=1.0`.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Capacity-1 token bucket whose `acquire` suspends the caller until a
/// token is available.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<BucketState>,
    /// Rate in tokens/sec, stored as f64 bits so updates are atomic and
    /// take effect on the next acquire without touching the bucket lock.
    rate_bits: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter admitting `rate_rps` requests per second.
    /// Non-positive rates are clamped to a minimal trickle.
    #[must_use]
    pub fn new(rate_rps: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: 1.0,
                last_refill: Instant::now(),
            }),
            rate_bits: AtomicU64::new(sanitize_rate(rate_rps).to_bits()),
        }
    }

    /// Current rate in requests per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Acquire))
    }

    /// Atomically change the rate. In-flight waiters pick the new rate up
    /// on their next refill computation.
    pub fn update_rate(&self, rate_rps: f64) {
        self.rate_bits
            .store(sanitize_rate(rate_rps).to_bits(), Ordering::Release);
    }

    /// Take one token, suspending until one has refilled.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                let rate = self.rate();
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * rate).min(1.0);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64((deficit / rate).min(60.0))
            };

            tokio::time::sleep(wait).await;
        }
    }
}

fn sanitize_rate(rate_rps: f64) -> f64 {
    if rate_rps.is_finite() && rate_rps > 0.0 {
        rate_rps
    } else {
        0.001
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn first_acquire_is_immediate() {
        let limiter = RateLimiter::new(1.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn tokens_do_not_accumulate_past_one() {
        let limiter = RateLimiter::new(50.0);
        // Idle long enough to refill many tokens at this rate.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        // Two of the three must have waited a full refill interval each.
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn update_rate_takes_effect_on_next_acquire() {
        let limiter = RateLimiter::new(2.0);
        limiter.acquire().await;

        limiter.update_rate(100.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
