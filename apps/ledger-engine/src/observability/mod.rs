//! Logging setup for processes embedding the engine.
//!
//! The engine itself only emits `tracing` events. A host calls
//! [`init_tracing`] once at startup to route them to stdout.
//!
//! # Example
//!
//! ```ignore
//! use ledger_engine::config::load_config;
//! use ledger_engine::observability::init_tracing;
//!
//! let config = load_config(None)?;
//! init_tracing(&config.observability.logging)?;
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogFormat, LoggingConfig};

/// Error type for logging setup.
#[derive(Debug, thiserror::Error)]
pub enum ObservabilityError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// Directive as configured.
        filter: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber is already installed.
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberError(String),
}

/// Filter for `config`, overridden by `RUST_LOG` when that is set.
///
/// # Errors
///
/// Returns [`ObservabilityError::InvalidFilter`] if the configured level
/// does not parse.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, ObservabilityError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| ObservabilityError::InvalidFilter {
        filter: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error if the level is invalid, or if a global
/// subscriber was already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ObservabilityError> {
    let filter = build_filter(config)?;

    let (json, pretty) = match config.format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(config.include_spans)
                    .with_span_list(config.include_spans),
            ),
            None,
        ),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| ObservabilityError::SubscriberError(e.to_string()))?;

    tracing::info!(
        level = %config.level,
        format = %config.format,
        "Tracing initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn directive_filters_parse() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(build_filter(&logging("ledger_engine=debug,warn")).is_ok());
        let Err(err) = build_filter(&logging("ledger_engine=loud")) else {
            panic!("expected invalid filter");
        };
        assert!(err.to_string().contains("ledger_engine=loud"));
    }

    #[test]
    fn second_install_is_refused() {
        let config = LoggingConfig {
            format: LogFormat::Pretty,
            ..logging("warn")
        };
        // The first call may already fail if a subscriber is set.
        let _ = init_tracing(&config);
        let Err(err) = init_tracing(&config) else {
            panic!("expected second install to fail");
        };
        assert!(matches!(err, ObservabilityError::SubscriberError(_)));
    }
}
