//! Stop enforcement value objects.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::ledger::Position;
use crate::domain::shared::{Money, Ticker, Timestamp};

/// A position whose stop-loss was breached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredExit {
    /// Ticker to exit.
    pub ticker: Ticker,
    /// Position as scanned.
    pub position: Position,
    /// Observed price at or below the stop.
    pub trigger_price: Money,
    /// Stop that was breached.
    pub stop_loss: Money,
    /// When the trigger price was quoted.
    pub price_as_of: Timestamp,
}

/// A position skipped because its price was too old to act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleQuote {
    /// Ticker affected.
    pub ticker: Ticker,
    /// Last known price.
    pub price: Money,
    /// Age of that price at scan time.
    #[serde(with = "duration_secs")]
    pub age: Duration,
}

/// A position skipped because no price could be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableQuote {
    /// Ticker affected.
    pub ticker: Ticker,
    /// Why the lookup failed.
    pub reason: String,
}

/// Outcome of scanning a portfolio's stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopScan {
    /// Positions to exit.
    pub triggered: Vec<TriggeredExit>,
    /// Positions whose price was too old to evaluate.
    pub stale: Vec<StaleQuote>,
    /// Positions whose price could not be fetched.
    pub unavailable: Vec<UnavailableQuote>,
}

impl StopScan {
    /// Whether every protected position was evaluated on fresh data.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stale.is_empty() && self.unavailable.is_empty()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
