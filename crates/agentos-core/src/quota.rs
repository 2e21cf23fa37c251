//! Per-tenant quota gate: QPS token bucket plus in-flight counters.
//!
//! Intentionally simple and in-memory; a later phase can swap this for a
//! distributed limiter behind the same surface. Buckets and counters are
//! allocated lazily per tenant and guarded by one mutex. The lock is never
//! held across I/O.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

#[derive(Debug, Default)]
struct LimiterState {
    buckets: HashMap<String, Bucket>,
    concurrent: HashMap<String, u32>,
}

/// In-memory per-tenant quota gate.
#[derive(Debug)]
pub struct Limiter {
    state: Mutex<LimiterState>,
    qps: u32,
    max_concurrent: u32,
}

impl Limiter {
    /// Creates a limiter with the given QPS and concurrency caps.
    #[must_use]
    pub fn new(qps: u32, max_concurrent: u32) -> Self {
        Self {
            state: Mutex::new(LimiterState::default()),
            qps: qps.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Returns true when the tenant is within its QPS budget, deducting one
    /// token on success.
    ///
    /// The bucket holds `qps` tokens at capacity and refills at `qps`
    /// tokens/second based on elapsed wall time.
    pub fn allow_qps(&self, tenant: &str) -> bool {
        let mut state = self.lock();
        let capacity = f64::from(self.qps);
        let now = Instant::now();

        let bucket = state.buckets.entry(tenant.to_string()).or_insert(Bucket {
            tokens: capacity,
            last: now,
        });

        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        bucket.last = now;
        bucket.tokens = (bucket.tokens + elapsed * capacity).min(capacity);

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    /// Increments the tenant's in-flight counter if below the cap.
    pub fn try_inc_concurrent(&self, tenant: &str) -> bool {
        let mut state = self.lock();
        let current = state.concurrent.entry(tenant.to_string()).or_insert(0);
        if *current >= self.max_concurrent {
            return false;
        }
        *current += 1;
        true
    }

    /// Decrements the tenant's in-flight counter, floored at zero.
    pub fn dec_concurrent(&self, tenant: &str) {
        let mut state = self.lock();
        if let Some(current) = state.concurrent.get_mut(tenant) {
            *current = current.saturating_sub(1);
        }
    }

    /// Returns the tenant's current in-flight count.
    #[must_use]
    pub fn concurrent(&self, tenant: &str) -> u32 {
        self.lock().concurrent.get(tenant).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LimiterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qps_bucket_exhausts_and_denies() {
        let limiter = Limiter::new(2, 10);
        assert!(limiter.allow_qps("tnt_a"));
        assert!(limiter.allow_qps("tnt_a"));
        // Capacity 2 is spent; the refill within the same instant is ~0.
        assert!(!limiter.allow_qps("tnt_a"));
    }

    #[test]
    fn qps_buckets_are_per_tenant() {
        let limiter = Limiter::new(1, 10);
        assert!(limiter.allow_qps("tnt_a"));
        assert!(limiter.allow_qps("tnt_b"));
        assert!(!limiter.allow_qps("tnt_a"));
    }

    #[test]
    fn concurrency_cap_is_enforced() {
        let limiter = Limiter::new(100, 2);
        assert!(limiter.try_inc_concurrent("tnt_a"));
        assert!(limiter.try_inc_concurrent("tnt_a"));
        assert!(!limiter.try_inc_concurrent("tnt_a"));

        limiter.dec_concurrent("tnt_a");
        assert!(limiter.try_inc_concurrent("tnt_a"));
    }

    #[test]
    fn dec_concurrent_floors_at_zero() {
        let limiter = Limiter::new(100, 2);
        limiter.dec_concurrent("tnt_a");
        limiter.dec_concurrent("tnt_a");
        assert_eq!(limiter.concurrent("tnt_a"), 0);
        assert!(limiter.try_inc_concurrent("tnt_a"));
        assert_eq!(limiter.concurrent("tnt_a"), 1);
    }
}
