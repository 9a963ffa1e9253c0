//! Minimum-interval request serialiser
//!
//! Every feed client owns one of these and awaits it before each request,
//! which serialises requests per client and enforces the feed's minimum
//! inter-request interval against a monotonic last-request timestamp.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::trace;

pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until the next request is allowed, then claim the slot.
    ///
    /// Holding the internal lock across the sleep is intentional: it makes
    /// concurrent callers queue instead of racing for the same slot.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                trace!(wait_ms = wait.as_millis() as u64, "rate limiter backoff");
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(500));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_second_acquire_waits() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_concurrent_acquires_serialise() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(50)));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let l = limiter.clone();
                tokio::spawn(async move { l.acquire().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }

        // three acquires need at least two full intervals between them
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
