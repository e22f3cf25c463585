//! Token-interval rate limiter for outbound telemetry calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Spaces acquisitions so that sustained throughput never exceeds the
/// configured calls-per-second. Each caller reserves the next free slot
/// under the lock, then sleeps outside it, so waiting callers do not block
/// one another.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` calls per second. Rates at or below
    /// zero disable limiting.
    pub fn per_second(rate: f64) -> Self {
        let interval = if rate > 0.0 {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };

        Self {
            interval,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Wait until an outbound call is allowed.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = if *next > now { *next } else { now };
            *next = slot + self.interval;
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquisitions_are_spaced() {
        let limiter = RateLimiter::per_second(100.0);
        let started = Instant::now();

        for _ in 0..4 {
            limiter.acquire().await;
        }

        // First slot is immediate, the remaining three are 10ms apart.
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_unlimited_rate_does_not_sleep() {
        let limiter = RateLimiter::per_second(0.0);
        let started = Instant::now();

        for _ in 0..100 {
            limiter.acquire().await;
        }

        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_concurrent_acquirers_share_the_rate() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::per_second(200.0));
        let started = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.expect("Task panicked");
        }

        assert!(started.elapsed() >= Duration::from_millis(25));
    }
}
