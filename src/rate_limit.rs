use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Minimum-interval gate for one upstream API.
///
/// Callers sharing a limiter are serialized; separate limiters never wait on
/// each other.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn per_second(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until `interval` has passed since the previous grant, then record
    /// a new grant.
    pub async fn acquire(&self) {
        let mut last = self.last_grant.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_grant_is_immediate() {
        let limiter = RateLimiter::per_second(5.0);
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_are_spaced_by_interval() {
        let limiter = RateLimiter::per_second(5.0);
        assert_eq!(limiter.interval(), Duration::from_millis(200));
        let start = Instant::now();
        for _ in 0..4 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_serialize() {
        let limiter = Arc::new(RateLimiter::with_interval(Duration::from_millis(100)));
        let start = Instant::now();
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiters_are_independent() {
        let a = RateLimiter::with_interval(Duration::from_millis(100));
        let b = RateLimiter::with_interval(Duration::from_millis(100));
        let start = Instant::now();
        tokio::join!(
            async {
                a.acquire().await;
                a.acquire().await;
            },
            async {
                b.acquire().await;
                b.acquire().await;
            }
        );
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_gap_needs_no_wait() {
        let limiter = RateLimiter::with_interval(Duration::from_millis(100));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_millis(150)).await;
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
