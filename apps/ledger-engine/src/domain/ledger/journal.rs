//! Journal entries: the append-only record of every state change.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::{Money, PortfolioId, Quantity, Ticker, Timestamp};

/// Kind of change a journal entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    /// Shares bought.
    Buy,
    /// Shares sold on request.
    Sell,
    /// Whole position sold because its stop-loss was breached.
    StopExit,
    /// Cash added to the portfolio.
    Deposit,
    /// Stop-loss on an existing position changed.
    StopUpdate,
}

impl TradeAction {
    /// Whether the entry moves shares.
    #[must_use]
    pub const fn is_trade(&self) -> bool {
        matches!(self, Self::Buy | Self::Sell | Self::StopExit)
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::StopExit => write!(f, "STOP_EXIT"),
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::StopUpdate => write!(f, "STOP_UPDATE"),
        }
    }
}

/// Immutable record of one applied change.
///
/// `sequence` is the ordering authority; `executed_at` is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeJournalEntry {
    /// Position of the entry in the portfolio's journal, starting at 1.
    pub sequence: u64,
    /// Portfolio the entry belongs to.
    pub portfolio_id: PortfolioId,
    /// What happened.
    pub action: TradeAction,
    /// Ticker affected (absent for deposits).
    pub ticker: Option<Ticker>,
    /// Shares moved (zero for deposits and stop updates).
    pub shares: Quantity,
    /// Execution price (zero for deposits and stop updates).
    pub price: Money,
    /// Stop-loss in force on the position after the entry.
    pub stop_loss: Option<Money>,
    /// Signed change to cash.
    pub cash_delta: Money,
    /// Cash balance after the entry.
    pub cash_after: Money,
    /// Gain or loss locked in by a sell or stop exit.
    pub realized_pnl: Option<Money>,
    /// When the change was applied.
    pub executed_at: Timestamp,
}

impl TradeJournalEntry {
    /// Whether this entry concerns `ticker`.
    #[must_use]
    pub fn concerns(&self, ticker: &Ticker) -> bool {
        self.ticker.as_ref() == Some(ticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn action_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&TradeAction::StopExit).unwrap(),
            "\"STOP_EXIT\""
        );
        assert_eq!(TradeAction::StopUpdate.to_string(), "STOP_UPDATE");
        assert!(TradeAction::Sell.is_trade());
        assert!(!TradeAction::Deposit.is_trade());
    }

    #[test]
    fn entry_concerns_ticker() {
        let aapl = Ticker::parse("AAPL").unwrap();
        let entry = TradeJournalEntry {
            sequence: 1,
            portfolio_id: PortfolioId::new("p1"),
            action: TradeAction::Buy,
            ticker: Some(aapl.clone()),
            shares: Quantity::from_i64(10),
            price: Money::new(dec!(150)),
            stop_loss: None,
            cash_delta: Money::new(dec!(-1500)),
            cash_after: Money::new(dec!(8500)),
            realized_pnl: None,
            executed_at: Timestamp::parse("2026-01-05T15:00:00Z").unwrap(),
        };
        assert!(entry.concerns(&aapl));
        assert!(!entry.concerns(&Ticker::parse("MSFT").unwrap()));
    }
}
