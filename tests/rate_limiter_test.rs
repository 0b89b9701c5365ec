//! Tests for the smooth rate limiter.

use crawlscope::RateLimiter;
use std::time::{Duration, Instant};

#[tokio::test]
async fn acquire_spacing_is_smooth() {
    let rate = 20.0;
    let interval = Duration::from_secs_f64(1.0 / rate);
    let limiter = RateLimiter::new(rate);

    let mut stamps = Vec::new();
    for _ in 0..8 {
        limiter.acquire().await;
        stamps.push(Instant::now());
    }

    // Mean inter-arrival time tracks 1/r. The lower bound is the real
    // smoothness assertion; the upper bound leaves slack for timer jitter.
    let total = stamps[stamps.len() - 1] - stamps[0];
    let mean = total / (stamps.len() as u32 - 1);
    assert!(
        mean >= interval.mul_f64(0.9),
        "mean inter-arrival {mean:?} too small for interval {interval:?}"
    );
    assert!(
        mean <= interval.mul_f64(1.5),
        "mean inter-arrival {mean:?} too large for interval {interval:?}"
    );
}

#[tokio::test]
async fn no_burst_after_idle() {
    let rate = 20.0;
    let interval = Duration::from_secs_f64(1.0 / rate);
    let limiter = RateLimiter::new(rate);

    // A long idle must not bank more than one token.
    tokio::time::sleep(interval * 5).await;

    let mut stamps = Vec::new();
    for _ in 0..6 {
        limiter.acquire().await;
        stamps.push(Instant::now());
    }

    // Never more than 2 acquisitions inside any single refill interval.
    for window in stamps.windows(3) {
        let spread = window[2] - window[0];
        assert!(
            spread >= interval.mul_f64(0.9),
            "3 acquisitions within {spread:?}, expected at least {interval:?}"
        );
    }
}

#[tokio::test]
async fn update_rate_applies_to_next_acquire() {
    let limiter = RateLimiter::new(2.0);
    limiter.acquire().await;

    // Raising the rate shortens the wait for the next token.
    limiter.update_rate(200.0);
    let start = Instant::now();
    limiter.acquire().await;
    assert!(start.elapsed() < Duration::from_millis(100));

    assert!((limiter.rate() - 200.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn nonpositive_rates_are_sanitized() {
    let limiter = RateLimiter::new(-5.0);
    assert!(limiter.rate() > 0.0);
    let limiter = RateLimiter::new(f64::NAN);
    assert!(limiter.rate() > 0.0);
}
