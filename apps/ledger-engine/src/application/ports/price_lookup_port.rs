//! Price Lookup Port (Driver Port)
//!
//! The narrow price interface consumed by the stop-loss monitor and the
//! trade executor. [`MarketDataGateway`](crate::application::services::MarketDataGateway)
//! is the production implementation; tests substitute fixed tables.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Money, Ticker, Timestamp};

/// Where an observed price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceOrigin {
    /// Fetched from the source during this lookup.
    Live,
    /// Served from the last-known-good cache.
    Cache,
}

impl fmt::Display for PriceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "LIVE"),
            Self::Cache => write!(f, "CACHE"),
        }
    }
}

/// A price together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Ticker the price is for.
    pub ticker: Ticker,
    /// Observed price.
    pub price: Money,
    /// When the price was observed at the source.
    pub as_of: Timestamp,
    /// Live or cached.
    pub origin: PriceOrigin,
    /// Whether the gateway served this in place of a live answer.
    pub stale: bool,
}

impl PriceObservation {
    /// Age of the price at `now`.
    #[must_use]
    pub fn age(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.as_of)
    }
}

/// Market data error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketDataError {
    /// The source failed after all retries and nothing is cached.
    #[error("Price for {ticker} unavailable after {attempts} attempts: {reason}")]
    Unavailable {
        /// Ticker requested.
        ticker: Ticker,
        /// Calls made to the source.
        attempts: u32,
        /// Last source error.
        reason: String,
    },

    /// The circuit is open and nothing is cached.
    #[error("Price source circuit open for {ticker}; retry in {retry_in:?}")]
    CircuitOpen {
        /// Ticker requested.
        ticker: Ticker,
        /// Time until the circuit allows a probe.
        retry_in: Option<Duration>,
    },

    /// A price exists but is older than the caller accepts.
    #[error("Price for {ticker} is {age:?} old (max {max_age:?})")]
    Stale {
        /// Ticker requested.
        ticker: Ticker,
        /// The stale price.
        price: Money,
        /// Its age.
        age: Duration,
        /// Largest acceptable age.
        max_age: Duration,
    },

    /// The source does not know the ticker.
    #[error("Ticker not found by price source: {ticker}")]
    NotFound {
        /// Ticker requested.
        ticker: Ticker,
    },
}

impl MarketDataError {
    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "PRICE_UNAVAILABLE",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Stale { .. } => "PRICE_STALE",
            Self::NotFound { .. } => "TICKER_NOT_FOUND",
        }
    }
}

/// Port for resolving a ticker to a price.
#[async_trait]
pub trait PriceLookupPort: Send + Sync {
    /// The best available price for `ticker`, live or cached.
    async fn get_price(&self, ticker: &Ticker) -> Result<PriceObservation, MarketDataError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn observation_age() {
        let as_of = Timestamp::parse("2026-01-05T15:00:00Z").unwrap();
        let observation = PriceObservation {
            ticker: Ticker::parse("AAPL").unwrap(),
            price: Money::new(dec!(150)),
            as_of,
            origin: PriceOrigin::Cache,
            stale: true,
        };
        let now = Timestamp::parse("2026-01-05T15:20:00Z").unwrap();
        assert_eq!(observation.age(now), Duration::from_secs(1200));
        assert_eq!(observation.age(as_of), Duration::ZERO);
    }

    #[test]
    fn error_codes() {
        let err = MarketDataError::NotFound {
            ticker: Ticker::parse("ZZZZ").unwrap(),
        };
        assert_eq!(err.code(), "TICKER_NOT_FOUND");
        assert_eq!(err.to_string(), "Ticker not found by price source: ZZZZ");
    }
}
