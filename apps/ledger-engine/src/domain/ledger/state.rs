//! Portfolio state value.

use std::collections::BTreeMap;

use super::Position;
use crate::domain::shared::{DomainError, Money, PortfolioId, Ticker, Timestamp};

/// Cash and open positions of one portfolio at one journal sequence.
///
/// Values of this type are never mutated after construction; transitions
/// produce new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortfolioState {
    portfolio_id: PortfolioId,
    cash: Money,
    positions: BTreeMap<Ticker, Position>,
    sequence: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
}

impl PortfolioState {
    /// A freshly created portfolio at sequence 0.
    #[must_use]
    pub fn genesis(portfolio_id: PortfolioId, starting_cash: Money, at: Timestamp) -> Self {
        Self {
            portfolio_id,
            cash: starting_cash,
            positions: BTreeMap::new(),
            sequence: 0,
            created_at: at,
            updated_at: at,
        }
    }

    /// Rebuild a state from stored parts, checking its invariants.
    pub fn from_parts(
        portfolio_id: PortfolioId,
        cash: Money,
        positions: Vec<Position>,
        sequence: u64,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Result<Self, DomainError> {
        if cash.is_negative() {
            return Err(DomainError::InvariantViolation {
                aggregate: "Portfolio".to_string(),
                invariant: "cash >= 0".to_string(),
                state: format!("{portfolio_id} cash={cash}"),
            });
        }
        let mut by_ticker = BTreeMap::new();
        for position in positions {
            if !position.shares.is_positive() {
                return Err(DomainError::InvariantViolation {
                    aggregate: "Position".to_string(),
                    invariant: "shares > 0".to_string(),
                    state: format!("{} shares={}", position.ticker, position.shares),
                });
            }
            let ticker = position.ticker.clone();
            if by_ticker.insert(ticker.clone(), position).is_some() {
                return Err(DomainError::InvariantViolation {
                    aggregate: "Portfolio".to_string(),
                    invariant: "one position per ticker".to_string(),
                    state: format!("duplicate {ticker}"),
                });
            }
        }
        Ok(Self {
            portfolio_id,
            cash,
            positions: by_ticker,
            sequence,
            created_at,
            updated_at,
        })
    }

    /// Portfolio identity.
    #[must_use]
    pub const fn portfolio_id(&self) -> &PortfolioId {
        &self.portfolio_id
    }

    /// Cash on hand.
    #[must_use]
    pub const fn cash(&self) -> Money {
        self.cash
    }

    /// Sequence of the last journal entry folded into this state.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// When the portfolio was created.
    #[must_use]
    pub const fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// When the last entry was applied.
    #[must_use]
    pub const fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Position in `ticker`, if one is open.
    #[must_use]
    pub fn position(&self, ticker: &Ticker) -> Option<&Position> {
        self.positions.get(ticker)
    }

    /// Open positions ordered by ticker.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Number of open positions.
    #[must_use]
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Cash plus the cost basis of every open position.
    #[must_use]
    pub fn book_equity(&self) -> Money {
        self.cash + self.positions.values().map(Position::cost_basis).sum()
    }

    /// The state one entry later.
    pub(crate) fn advance(
        &self,
        cash: Money,
        ticker: &Ticker,
        position: Option<Position>,
        at: Timestamp,
    ) -> Self {
        let mut positions = self.positions.clone();
        match position {
            Some(p) => {
                positions.insert(ticker.clone(), p);
            }
            None => {
                positions.remove(ticker);
            }
        }
        Self {
            cash,
            positions,
            sequence: self.sequence + 1,
            updated_at: at,
            ..self.clone()
        }
    }

    /// The state one entry later with positions untouched.
    pub(crate) fn advance_cash(&self, cash: Money, at: Timestamp) -> Self {
        Self {
            cash,
            sequence: self.sequence + 1,
            updated_at: at,
            ..self.clone()
        }
    }
}
