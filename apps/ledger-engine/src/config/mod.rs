//! Configuration module for the ledger engine.
//!
//! Provides configuration loading, validation, and environment variable
//! interpolation for all engine components. Every field has a default, so
//! an empty document is a valid configuration.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ledger_engine::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/config.yaml"))?;
//!
//! let limits = config.validation.to_limits();
//! ```

mod executor;
mod market_data;
mod observability;
mod persistence;
mod stops;
mod validation;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use executor::ExecutorConfig;
pub use market_data::{CacheSettings, CircuitBreakerSettings, MarketDataConfig, RetrySettings};
pub use observability::{LogFormat, LoggingConfig, ObservabilityConfig};
pub use persistence::{PersistenceConfig, SnapshotSettings};
pub use stops::StopsConfig;
pub use validation::ValidationConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Trade validation limits.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Market data gateway configuration.
    #[serde(default)]
    pub market_data: MarketDataConfig,
    /// Persistence configuration.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Trade executor configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Stop-loss monitor configuration.
    #[serde(default)]
    pub stops: StopsConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. An unset or empty
/// variable without a default becomes the empty string.
#[allow(clippy::expect_used)] // Regex is a constant pattern
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let var_name = cap.get(1).map_or("", |m| m.as_str());
        let default_value = cap.get(2).map(|m| m.as_str());

        match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let v = &config.validation;
    if v.max_shares <= Decimal::ZERO {
        return Err(invalid("validation.max_shares must be positive"));
    }
    if v.max_price <= Decimal::ZERO {
        return Err(invalid("validation.max_price must be positive"));
    }
    if v.max_notional <= Decimal::ZERO {
        return Err(invalid("validation.max_notional must be positive"));
    }
    if v.max_open_positions == Some(0) {
        return Err(invalid("validation.max_open_positions must be at least 1"));
    }
    if let Some(fraction) = v.max_position_fraction
        && (fraction <= Decimal::ZERO || fraction > Decimal::ONE)
    {
        return Err(invalid(
            "validation.max_position_fraction must be in (0, 1]",
        ));
    }

    let retry = &config.market_data.retry;
    if retry.backoff_multiplier < 1.0 {
        return Err(invalid(
            "market_data.retry.backoff_multiplier must be at least 1.0",
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter_factor) {
        return Err(invalid(
            "market_data.retry.jitter_factor must be between 0.0 and 1.0",
        ));
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        return Err(invalid(
            "market_data.retry.initial_backoff_ms must not exceed max_backoff_ms",
        ));
    }
    if config.market_data.circuit_breaker.failure_threshold == 0 {
        return Err(invalid(
            "market_data.circuit_breaker.failure_threshold must be at least 1",
        ));
    }

    let p = &config.persistence;
    if p.data_dir.trim().is_empty() {
        return Err(invalid("persistence.data_dir must not be empty"));
    }
    if p.lock_timeout_ms == 0 || p.lease_secs == 0 || p.poll_interval_ms == 0 {
        return Err(invalid(
            "persistence.lock_timeout_ms, lease_secs and poll_interval_ms must be positive",
        ));
    }

    let e = &config.executor;
    if e.max_attempts == 0 {
        return Err(invalid("executor.max_attempts must be at least 1"));
    }
    if e.conflict_backoff_ms > e.max_conflict_backoff_ms {
        return Err(invalid(
            "executor.conflict_backoff_ms must not exceed max_conflict_backoff_ms",
        ));
    }

    if config.observability.logging.level.trim().is_empty() {
        return Err(invalid("observability.logging.level must not be empty"));
    }

    Ok(())
}
