use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Exponential,
    Linear,
    Fixed,
}

/// Controller settings. Every field has a default, so a settings file only
/// needs to name what it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Fetch-mutate-submit rounds the applier attempts before giving up on a
    /// conflicting object.
    pub max_apply_attempts: u32,
    /// Deadline for all store calls of one tick.
    pub store_timeout_ms: u64,
    /// Requeue delay while a stage reports `in_progress`.
    pub poll_interval_ms: u64,
    /// Consecutive failed ticks before failures are escalated in the log.
    pub max_retries: u32,
    pub backoff_strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    /// Upper bound on any requeue delay. Also the delay after fatal errors.
    pub max_delay_ms: u64,
    pub status_path: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_apply_attempts: 3,
            store_timeout_ms: 30_000,
            poll_interval_ms: 5_000,
            max_retries: 5,
            backoff_strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 300_000,
            status_path: "observability-status.json".into(),
            log_filter: "info".into(),
        }
    }
}
