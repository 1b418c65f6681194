//! Materialized checkpoints of portfolio state.

use serde::{Deserialize, Serialize};

use super::{PortfolioState, Position};
use crate::domain::shared::{DomainError, Money, PortfolioId, Timestamp};

/// Cash and positions as of one journal sequence.
///
/// Rebuilding state from a snapshot only needs the journal entries recorded
/// after `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Portfolio the snapshot belongs to.
    pub portfolio_id: PortfolioId,
    /// Journal sequence the snapshot reflects.
    pub sequence: u64,
    /// Cash balance.
    pub cash: Money,
    /// Open positions ordered by ticker.
    pub positions: Vec<Position>,
    /// When the portfolio was created.
    pub portfolio_created_at: Timestamp,
    /// When the state was last changed.
    pub as_of: Timestamp,
    /// When the snapshot was written.
    pub taken_at: Timestamp,
}

impl Snapshot {
    /// Capture `state`.
    #[must_use]
    pub fn capture(state: &PortfolioState, taken_at: Timestamp) -> Self {
        Self {
            portfolio_id: state.portfolio_id().clone(),
            sequence: state.sequence(),
            cash: state.cash(),
            positions: state.positions().cloned().collect(),
            portfolio_created_at: state.created_at(),
            as_of: state.updated_at(),
            taken_at,
        }
    }

    /// The state this snapshot describes.
    pub fn to_state(&self) -> Result<PortfolioState, DomainError> {
        PortfolioState::from_parts(
            self.portfolio_id.clone(),
            self.cash,
            self.positions.clone(),
            self.sequence,
            self.portfolio_created_at,
            self.as_of,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::apply_buy;
    use crate::domain::shared::{Quantity, Ticker};
    use rust_decimal_macros::dec;

    #[test]
    fn capture_and_restore() {
        let at = Timestamp::parse("2026-01-05T15:00:00Z").unwrap();
        let genesis = PortfolioState::genesis(PortfolioId::new("p1"), Money::new(dec!(1000)), at);
        let (state, _) = apply_buy(
            &genesis,
            &Ticker::parse("MSFT").unwrap(),
            Quantity::from_i64(2),
            Money::new(dec!(400)),
            None,
            at,
        )
        .unwrap();

        let snapshot = Snapshot::capture(&state, at);
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.positions.len(), 1);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.to_state().unwrap(), state);
    }
}
