//! Per-tenant usage metering and token budget checks.
//!
//! The meter accumulates integer-coercible usage metrics per tenant and, for
//! `total_tokens`, also feeds hourly (`YYYY-MM-DD-HH`) and daily
//! (`YYYY-MM-DD`) UTC buckets. Budget checks deny when the current bucket has
//! already reached the limit, strictly before any new usage is recorded.
//!
//! Buckets are in-memory and monotonically accumulating. A multi-instance
//! deployment would need these checks to be strongly consistent; the ordering
//! contract (deny before record) is what the tests pin down.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde_json::Value;

use agentos_core::tenant::TenantPolicy;

/// Usage metric key that feeds the token budget buckets.
const TOTAL_TOKENS: &str = "total_tokens";

#[derive(Debug, Default)]
struct MeterState {
    /// tenant → metric → accumulated value.
    totals: HashMap<String, HashMap<String, i64>>,
    /// (tenant, `YYYY-MM-DD-HH`) → tokens.
    hourly: HashMap<(String, String), i64>,
    /// (tenant, `YYYY-MM-DD`) → tokens.
    daily: HashMap<(String, String), i64>,
}

/// In-memory per-tenant usage meter.
#[derive(Debug, Default)]
pub struct UsageMeter {
    state: Mutex<MeterState>,
}

impl UsageMeter {
    /// Creates an empty meter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records provider-reported usage for a tenant.
    pub fn record(&self, tenant_id: &str, usage: &serde_json::Map<String, Value>) {
        self.record_at(tenant_id, usage, Utc::now());
    }

    /// Records usage at an explicit instant (bucket selection).
    pub fn record_at(
        &self,
        tenant_id: &str,
        usage: &serde_json::Map<String, Value>,
        now: DateTime<Utc>,
    ) {
        if tenant_id.is_empty() || usage.is_empty() {
            return;
        }
        let mut state = self.lock();
        let totals = state.totals.entry(tenant_id.to_string()).or_default();
        let mut tokens = 0;
        for (key, value) in usage {
            let Some(amount) = to_i64(value) else {
                continue;
            };
            *totals.entry(key.clone()).or_insert(0) += amount;
            if key == TOTAL_TOKENS {
                tokens = amount;
            }
        }
        if tokens != 0 {
            *state
                .hourly
                .entry((tenant_id.to_string(), hourly_bucket(now)))
                .or_insert(0) += tokens;
            *state
                .daily
                .entry((tenant_id.to_string(), daily_bucket(now)))
                .or_insert(0) += tokens;
        }
    }

    /// Checks the tenant's token budget against the current buckets.
    ///
    /// Returns `(false, reason)` when the bucket has already reached the
    /// limit. Budget fields that are unset or ≤ 0 disable their dimension.
    #[must_use]
    pub fn check_budget(&self, tenant_id: &str, policy: &TenantPolicy) -> (bool, Option<String>) {
        self.check_budget_at(tenant_id, policy, Utc::now())
    }

    /// Checks the budget at an explicit instant (bucket selection).
    #[must_use]
    pub fn check_budget_at(
        &self,
        tenant_id: &str,
        policy: &TenantPolicy,
        now: DateTime<Utc>,
    ) -> (bool, Option<String>) {
        let state = self.lock();
        if let Some(limit) = policy.max_tokens_per_hour.filter(|limit| *limit > 0) {
            let used = state
                .hourly
                .get(&(tenant_id.to_string(), hourly_bucket(now)))
                .copied()
                .unwrap_or(0);
            if used >= limit {
                return (false, Some("hourly_token_budget_exceeded".to_string()));
            }
        }
        if let Some(limit) = policy.max_tokens_per_day.filter(|limit| *limit > 0) {
            let used = state
                .daily
                .get(&(tenant_id.to_string(), daily_bucket(now)))
                .copied()
                .unwrap_or(0);
            if used >= limit {
                return (false, Some("daily_token_budget_exceeded".to_string()));
            }
        }
        (true, None)
    }

    /// Returns a tenant's accumulated value for one metric.
    #[must_use]
    pub fn total(&self, tenant_id: &str, metric: &str) -> i64 {
        self.lock()
            .totals
            .get(tenant_id)
            .and_then(|metrics| metrics.get(metric))
            .copied()
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MeterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn hourly_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d-%H").to_string()
}

fn daily_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn usage(tokens: i64) -> serde_json::Map<String, Value> {
        json!({
            "prompt_tokens": tokens / 2,
            "completion_tokens": tokens - tokens / 2,
            "total_tokens": tokens,
            "provider": "stub"
        })
        .as_object()
        .expect("object")
        .clone()
    }

    fn hourly_policy(limit: i64) -> TenantPolicy {
        TenantPolicy {
            max_tokens_per_hour: Some(limit),
            ..TenantPolicy::default()
        }
    }

    #[test]
    fn record_accumulates_integer_metrics_only() {
        let meter = UsageMeter::new();
        meter.record("tnt_a", &usage(40));
        meter.record("tnt_a", &usage(20));

        assert_eq!(meter.total("tnt_a", "total_tokens"), 60);
        assert_eq!(meter.total("tnt_a", "prompt_tokens"), 30);
        // Non-numeric metrics are skipped.
        assert_eq!(meter.total("tnt_a", "provider"), 0);
        // Other tenants are untouched.
        assert_eq!(meter.total("tnt_b", "total_tokens"), 0);
    }

    #[test]
    fn budget_denies_at_limit_before_recording() {
        let meter = UsageMeter::new();
        let policy = hourly_policy(1);

        // Budget ordering: the first request passes on an empty bucket...
        let (allowed, _) = meter.check_budget("tnt_a", &policy);
        assert!(allowed);
        meter.record("tnt_a", &usage(1));

        // ...and the next is denied before its usage would be recorded.
        let (allowed, reason) = meter.check_budget("tnt_a", &policy);
        assert!(!allowed);
        assert_eq!(reason.as_deref(), Some("hourly_token_budget_exceeded"));
    }

    #[test]
    fn daily_budget_uses_its_own_bucket() {
        let meter = UsageMeter::new();
        let policy = TenantPolicy {
            max_tokens_per_day: Some(50),
            ..TenantPolicy::default()
        };
        meter.record("tnt_a", &usage(50));
        let (allowed, reason) = meter.check_budget("tnt_a", &policy);
        assert!(!allowed);
        assert_eq!(reason.as_deref(), Some("daily_token_budget_exceeded"));
    }

    #[test]
    fn non_positive_limits_disable_the_dimension() {
        let meter = UsageMeter::new();
        meter.record("tnt_a", &usage(1_000_000));

        for policy in [
            TenantPolicy::default(),
            hourly_policy(0),
            hourly_policy(-1),
        ] {
            let (allowed, _) = meter.check_budget("tnt_a", &policy);
            assert!(allowed, "policy {policy:?}");
        }
    }

    #[test]
    fn buckets_roll_over_between_hours() {
        let meter = UsageMeter::new();
        let policy = hourly_policy(10);

        let earlier = Utc.with_ymd_and_hms(2026, 8, 2, 9, 30, 0).single().expect("time");
        let later = Utc.with_ymd_and_hms(2026, 8, 2, 10, 5, 0).single().expect("time");

        meter.record_at("tnt_a", &usage(10), earlier);
        let (allowed, _) = meter.check_budget_at("tnt_a", &policy, earlier);
        assert!(!allowed);

        // A fresh hour starts with an empty bucket.
        let (allowed, _) = meter.check_budget_at("tnt_a", &policy, later);
        assert!(allowed);
    }

    #[test]
    fn token_buckets_only_track_total_tokens() {
        let meter = UsageMeter::new();
        let now = Utc::now();
        let mut no_total = serde_json::Map::new();
        no_total.insert("prompt_tokens".to_string(), json!(5));
        meter.record_at("tnt_a", &no_total, now);

        let (allowed, _) = meter.check_budget_at("tnt_a", &hourly_policy(1), now);
        assert!(allowed);
    }
}
