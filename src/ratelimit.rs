use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Classic token bucket. `acquire()` cooperatively sleeps until a token is
/// available instead of polling or running its own background refill task —
/// refill is computed lazily from elapsed wall-clock time on each call.
pub struct RateLimiter {
    inner: Mutex<Bucket>,
    capacity: f64,
    refill_per_sec: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            inner: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_per_sec,
        }
    }

    /// Blocks until a single token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.inner.lock().expect("ratelimit mutex poisoned");
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            bucket.last_refill = now;
        }
    }

    #[cfg(test)]
    fn available(&self) -> f64 {
        let mut bucket = self.inner.lock().unwrap();
        self.refill(&mut bucket);
        bucket.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_full_and_drains_on_acquire() {
        let limiter = RateLimiter::new(3.0, 1.0);
        assert!(limiter.available() >= 2.9);
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(limiter.available() < 0.5);
    }

    #[tokio::test]
    async fn refills_over_time_but_never_exceeds_capacity() {
        let limiter = RateLimiter::new(2.0, 1000.0);
        limiter.acquire().await;
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.available() <= 2.0);
        assert!(limiter.available() > 0.0);
    }

    #[tokio::test]
    async fn acquire_waits_when_bucket_empty() {
        let limiter = RateLimiter::new(1.0, 20.0);
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
