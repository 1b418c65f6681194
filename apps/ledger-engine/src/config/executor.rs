//! Trade executor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::use_cases::TradeExecutorConfig;
use crate::resilience::RetryPolicy;

/// Trade executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Attempts at load, validate and commit before giving up on contention.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// First backoff after a conflict (milliseconds).
    #[serde(default = "default_conflict_backoff_ms")]
    pub conflict_backoff_ms: u64,
    /// Backoff cap between conflict retries (milliseconds).
    #[serde(default = "default_max_conflict_backoff_ms")]
    pub max_conflict_backoff_ms: u64,
    /// Oldest looked-up price a trade may execute at (seconds).
    #[serde(default = "default_max_price_age_secs")]
    pub max_price_age_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            conflict_backoff_ms: default_conflict_backoff_ms(),
            max_conflict_backoff_ms: default_max_conflict_backoff_ms(),
            max_price_age_secs: default_max_price_age_secs(),
        }
    }
}

impl ExecutorConfig {
    /// Convert to the executor's runtime settings.
    #[must_use]
    pub const fn to_executor_config(&self) -> TradeExecutorConfig {
        TradeExecutorConfig {
            conflict_retry: RetryPolicy {
                max_retries: self.max_attempts.saturating_sub(1),
                initial_backoff: Duration::from_millis(self.conflict_backoff_ms),
                max_backoff: Duration::from_millis(self.max_conflict_backoff_ms),
                backoff_multiplier: 2.0,
                jitter_factor: 0.5,
            },
            max_price_age: Duration::from_secs(self.max_price_age_secs),
        }
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_conflict_backoff_ms() -> u64 {
    25
}

const fn default_max_conflict_backoff_ms() -> u64 {
    250
}

const fn default_max_price_age_secs() -> u64 {
    15 * 60
}
