//! Token-bucket rate limiting, one pair of buckets (per-minute, per-hour)
//! per `(session_id, method_class)`. A rejected call consumes no tokens
//! from either bucket — only successful calls count against the budget.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use i3g_domain::config::RateLimitsConfig;
use i3g_domain::trace::TraceEvent;
use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, per: Duration) -> Self {
        let capacity = capacity as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_per_sec: capacity / per.as_secs_f64(),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = Instant::now();
    }

    fn has_capacity(&mut self) -> bool {
        self.refill();
        self.tokens >= 1.0
    }

    fn consume(&mut self) {
        self.tokens -= 1.0;
    }
}

struct BucketPair {
    per_minute: Bucket,
    per_hour: Bucket,
}

/// Per-`(session_id, method_class)` rate limiter. One instance shared by
/// every API connection.
pub struct RateLimiter {
    limits: RateLimitsConfig,
    buckets: Mutex<HashMap<(String, String), BucketPair>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimitsConfig) -> Self {
        Self {
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Check and, on success, consume one token from both buckets for
    /// `(session_id, method_class)`. Returns `false` (no tokens consumed)
    /// if either bucket is exhausted.
    pub fn check_and_consume(&self, session_id: &str, method_class: &str) -> bool {
        let mut buckets = self.buckets.lock();
        let pair = buckets
            .entry((session_id.to_string(), method_class.to_string()))
            .or_insert_with(|| BucketPair {
                per_minute: Bucket::new(self.limits.per_minute, Duration::from_secs(60)),
                per_hour: Bucket::new(self.limits.per_hour, Duration::from_secs(3600)),
            });

        if !pair.per_minute.has_capacity() || !pair.per_hour.has_capacity() {
            TraceEvent::RateLimited {
                session_id: session_id.to_string(),
                method: method_class.to_string(),
            }
            .emit();
            return false;
        }
        pair.per_minute.consume();
        pair.per_hour.consume();
        true
    }

    /// Drop bucket state for a session that's gone (expired or
    /// disconnected), so the map doesn't grow without bound.
    pub fn forget_session(&self, session_id: &str) {
        self.buckets.lock().retain(|(sid, _), _| sid != session_id);
    }
}
