//! Token bucket rate limiter shared by all send workers.

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};

/// Token bucket for a single request budget.
///
/// Tokens are added at a constant rate and consumed when requests are made.
/// If no tokens are available, the caller must wait.
pub struct TokenBucket {
    /// Max tokens (= requests per minute).
    capacity: f32,
    /// Current available tokens.
    tokens: f32,
    /// Tokens added per second.
    refill_rate: f32,
    /// Last refill time.
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a new token bucket with the given rate limit.
    ///
    /// The bucket starts full, allowing immediate requests up to the capacity.
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute as f32;
        Self {
            capacity,
            tokens: capacity, // Start full
            refill_rate: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Try to acquire a token.
    ///
    /// Returns `Ok(())` if a token was acquired successfully.
    /// Returns `Err(wait_duration)` if rate limited, with the duration to wait.
    pub fn try_acquire(&mut self) -> Result<(), Duration> {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let wait_secs = tokens_needed / self.refill_rate;
            Err(Duration::from_secs_f32(wait_secs))
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f32();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// Provider request budget shared across all workers and campaigns.
///
/// A rate limit of 0 requests per minute disables limiting entirely.
pub struct RateLimiter {
    bucket: Option<Mutex<TokenBucket>>,
}

impl RateLimiter {
    /// Create a limiter for the given budget. 0 rpm = unlimited.
    pub fn new(requests_per_minute: u32) -> Self {
        let bucket = if requests_per_minute == 0 {
            None
        } else {
            Some(Mutex::new(TokenBucket::new(requests_per_minute)))
        };
        Self { bucket }
    }

    /// Create a limiter that never blocks.
    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    /// Acquire a send slot, sleeping until one is available.
    pub async fn acquire(&self) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        loop {
            let wait = {
                let mut bucket = bucket.lock().await;
                match bucket.try_acquire() {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            sleep(wait).await;
        }
    }

    /// Whether this limiter enforces a budget.
    pub fn is_limited(&self) -> bool {
        self.bucket.is_some()
    }
}
