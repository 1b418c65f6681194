//! Price Source Port (Driven Port)
//!
//! Interface to the external market-data collaborator that quotes one ticker
//! at a time.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Money, Ticker, Timestamp};
use crate::resilience::ErrorCategory;

/// A price as reported by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Last traded price.
    pub price: Money,
    /// When the source says the price was observed.
    pub as_of: Timestamp,
}

/// Price source error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceSourceError {
    /// Network failure, timeout, or a 5xx-style answer.
    #[error("Price source transient error: {message}")]
    Transient {
        /// Error details.
        message: String,
    },

    /// The source asked us to slow down.
    #[error("Rate limited by price source")]
    RateLimited {
        /// Wait suggested by the source, if any.
        retry_after: Option<Duration>,
    },

    /// The source does not know the ticker.
    #[error("Ticker not found: {ticker}")]
    NotFound {
        /// The unknown ticker.
        ticker: Ticker,
    },

    /// Any other failure that retrying will not fix.
    #[error("Price source error: {message}")]
    Permanent {
        /// Error details.
        message: String,
    },
}

impl PriceSourceError {
    /// How the retry loop should treat this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient { .. } => ErrorCategory::Retryable,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::NotFound { .. } | Self::Permanent { .. } => ErrorCategory::NonRetryable,
        }
    }

    /// Wait suggested by the source for a rate-limit answer.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Port for the external price source.
#[async_trait]
pub trait PriceSourcePort: Send + Sync {
    /// Fetch the current price of `ticker`.
    async fn fetch_price(&self, ticker: &Ticker) -> Result<PriceQuote, PriceSourceError>;
}
