// src/core/ratelimit.rs

//! A generic token bucket shared by the rate-limit filter and the alert
//! dispatcher's per-channel send limiter (spec.md sections 4.D and 4.G).

use parking_lot::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, window: Duration) -> Self {
        let capacity = capacity.max(1) as f64;
        let refill_per_sec = capacity / window.as_secs_f64().max(0.001);
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// A single token bucket: `capacity` tokens replenish uniformly over
/// `window`. `try_acquire` is non-blocking.
pub struct TokenBucket {
    inner: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            inner: Mutex::new(Bucket::new(capacity, window)),
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.inner.lock().try_take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausts_after_capacity_requests() {
        let bucket = TokenBucket::new(2, Duration::from_secs(60));
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }
}
