//! Market data gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::MarketDataGatewayConfig;
use crate::resilience::RetryPolicy;

/// Market data gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketDataConfig {
    /// Retry settings for one lookup.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Circuit breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
    /// Cached price fallback settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

impl MarketDataConfig {
    /// Convert to the gateway's runtime settings.
    #[must_use]
    pub fn to_gateway_config(&self) -> MarketDataGatewayConfig {
        MarketDataGatewayConfig {
            retry: self.retry.to_retry_policy(),
            circuit_breaker: self.circuit_breaker.to_resilience_config(),
            max_fallback_age: Duration::from_secs(self.cache.max_fallback_age_secs),
        }
    }
}

/// Retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff (milliseconds).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Backoff cap (milliseconds).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Random spread as a fraction of the backoff.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetrySettings {
    /// Convert to the resilience module's `RetryPolicy`.
    #[must_use]
    pub const fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Consecutive failed lookups that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Time in the open state before a probe (seconds).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl CircuitBreakerSettings {
    /// Convert to the resilience module's `CircuitBreakerConfig`.
    #[must_use]
    pub const fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

/// Cached price fallback settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Oldest cached price served when the source is unavailable (seconds).
    #[serde(default = "default_max_fallback_age_secs")]
    pub max_fallback_age_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_fallback_age_secs: default_max_fallback_age_secs(),
        }
    }
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1_000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_jitter_factor() -> f64 {
    0.2
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_cooldown_secs() -> u64 {
    60
}

const fn default_max_fallback_age_secs() -> u64 {
    24 * 60 * 60
}
