//! Requeue backoff for failing ticks.
//!
//! `RetryPolicy` turns a consecutive-failure count into a delay using one of
//! the configured strategies, capped at `max_delay_ms`. `FailureTracker`
//! keeps that count per instance and forgets it on the first success.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::config::{BackoffStrategy, Settings};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before they are escalated.
    pub max_retries: u32,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        strategy: BackoffStrategy,
        base_delay_ms: u64,
        max_delay_ms: u64,
    ) -> Self {
        // delays are floored at 1ms so a failing tick is never requeued at once
        let base_delay_ms = base_delay_ms.max(1);
        RetryPolicy {
            max_retries,
            strategy,
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        RetryPolicy::new(
            settings.max_retries,
            settings.backoff_strategy,
            settings.base_delay_ms,
            settings.max_delay_ms,
        )
    }

    /// Whether the given failure count is still within budget.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_retries
    }

    /// Delay before the retry that follows `attempt` (0-indexed) failures.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let raw = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay_ms,
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(attempt as u64 + 1),
            BackoffStrategy::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
        };
        raw.min(self.max_delay_ms)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_settings(&Settings::default())
    }
}

// ---------------------------------------------------------------------------
// FailureTracker
// ---------------------------------------------------------------------------

/// Consecutive failure counts keyed by instance (`namespace/name`).
#[derive(Debug, Clone, Default)]
pub struct FailureTracker {
    policy: RetryPolicy,
    failures: HashMap<String, u32>,
}

impl FailureTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        FailureTracker {
            policy,
            failures: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record a failure and return the delay before the next attempt.
    pub fn record_failure(&mut self, key: &str) -> Duration {
        let count = self.failures.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        self.policy.delay(*count - 1)
    }

    pub fn record_success(&mut self, key: &str) {
        self.failures.remove(key);
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// True once the instance has failed more times in a row than the
    /// policy tolerates.
    pub fn exhausted(&self, key: &str) -> bool {
        !self.policy.should_retry(self.failure_count(key))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_follows_settings() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries, 5);
        assert_eq!(p.base_delay_ms, 1000);
        assert_eq!(p.max_delay_ms, 300_000);
        assert!(matches!(p.strategy, BackoffStrategy::Exponential));
    }

    #[test]
    fn should_retry_within_budget() {
        let p = RetryPolicy::new(3, BackoffStrategy::Fixed, 100, 1000);
        assert!(p.should_retry(0));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
    }

    #[test]
    fn fixed_delay() {
        let p = RetryPolicy::new(3, BackoffStrategy::Fixed, 500, 10_000);
        assert_eq!(p.delay_ms(0), 500);
        assert_eq!(p.delay_ms(5), 500);
    }

    #[test]
    fn linear_delay() {
        let p = RetryPolicy::new(5, BackoffStrategy::Linear, 1000, 10_000);
        assert_eq!(p.delay_ms(0), 1000);
        assert_eq!(p.delay_ms(1), 2000);
        assert_eq!(p.delay_ms(2), 3000);
    }

    #[test]
    fn exponential_delay() {
        let p = RetryPolicy::new(5, BackoffStrategy::Exponential, 1000, 60_000);
        assert_eq!(p.delay_ms(0), 1000);
        assert_eq!(p.delay_ms(1), 2000);
        assert_eq!(p.delay_ms(3), 8000);
    }

    #[test]
    fn delay_capped_at_max() {
        let p = RetryPolicy::new(5, BackoffStrategy::Exponential, 1000, 5000);
        assert_eq!(p.delay_ms(2), 4000);
        assert_eq!(p.delay_ms(3), 5000);
        assert_eq!(p.delay_ms(63), 5000);
        assert_eq!(p.delay_ms(200), 5000);
    }

    #[test]
    fn zero_delays_floored() {
        let p = RetryPolicy::new(3, BackoffStrategy::Exponential, 0, 0);
        assert_eq!(p.delay_ms(0), 1);
        assert_eq!(p.delay_ms(4), 1);
        assert_eq!(p.max_delay(), Duration::from_millis(1));
    }

    #[test]
    fn tracker_grows_then_resets() {
        let policy = RetryPolicy::new(5, BackoffStrategy::Exponential, 100, 10_000);
        let mut t = FailureTracker::new(policy);
        assert_eq!(t.record_failure("obs/stack"), Duration::from_millis(100));
        assert_eq!(t.record_failure("obs/stack"), Duration::from_millis(200));
        assert_eq!(t.record_failure("obs/stack"), Duration::from_millis(400));
        assert_eq!(t.failure_count("obs/stack"), 3);

        t.record_success("obs/stack");
        assert_eq!(t.failure_count("obs/stack"), 0);
        assert_eq!(t.record_failure("obs/stack"), Duration::from_millis(100));
    }

    #[test]
    fn tracker_exhaustion() {
        let mut t = FailureTracker::new(RetryPolicy::new(2, BackoffStrategy::Fixed, 100, 100));
        t.record_failure("a");
        assert!(!t.exhausted("a"));
        t.record_failure("a");
        assert!(t.exhausted("a"));
    }

    #[test]
    fn tracker_independent_keys() {
        let mut t = FailureTracker::new(RetryPolicy::new(1, BackoffStrategy::Fixed, 100, 100));
        t.record_failure("a");
        assert!(t.exhausted("a"));
        assert!(!t.exhausted("b"));
    }
}
