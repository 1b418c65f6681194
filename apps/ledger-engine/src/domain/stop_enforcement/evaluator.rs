//! Stop-loss evaluation for a single position.

use std::time::Duration;

use super::{StaleQuote, TriggeredExit};
use crate::domain::ledger::Position;
use crate::domain::shared::{Money, Timestamp};

/// Result of checking one position against one price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCheck {
    /// Position has no stop-loss.
    Unprotected,
    /// Price above the stop.
    Clear,
    /// Price at or below the stop.
    Triggered(TriggeredExit),
    /// Price too old to decide either way.
    Stale(StaleQuote),
}

/// Check `position` against a price quoted at `as_of`.
///
/// A price older than `max_age` at `now` never triggers and never clears;
/// it is reported as stale.
#[must_use]
pub fn evaluate_stop(
    position: &Position,
    price: Money,
    as_of: Timestamp,
    now: Timestamp,
    max_age: Duration,
) -> StopCheck {
    let Some(stop_loss) = position.stop_loss else {
        return StopCheck::Unprotected;
    };

    let age = now.saturating_since(as_of);
    if age > max_age {
        return StopCheck::Stale(StaleQuote {
            ticker: position.ticker.clone(),
            price,
            age,
        });
    }

    if position.stop_breached(price) {
        StopCheck::Triggered(TriggeredExit {
            ticker: position.ticker.clone(),
            position: position.clone(),
            trigger_price: price,
            stop_loss,
            price_as_of: as_of,
        })
    } else {
        StopCheck::Clear
    }
}
