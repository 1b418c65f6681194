//! Trade DTOs

use serde::{Deserialize, Serialize};

use crate::domain::ledger::{PortfolioState, Position, TradeJournalEntry};
use crate::domain::shared::{Money, PortfolioId, Quantity};
use crate::domain::validation::{OrderSide, TradeProposal};

/// A trade as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Portfolio to trade in.
    pub portfolio_id: PortfolioId,
    /// Ticker as typed; normalized during validation.
    pub ticker: String,
    /// Buy or sell.
    #[serde(alias = "action")]
    pub side: OrderSide,
    /// Shares to trade.
    pub shares: Quantity,
    /// Execution price; looked up when absent.
    #[serde(default)]
    pub price: Option<Money>,
    /// Stop-loss to set on the position.
    #[serde(default)]
    pub stop_loss: Option<Money>,
}

impl TradeRequest {
    /// A buy request.
    #[must_use]
    pub fn buy(portfolio_id: PortfolioId, ticker: impl Into<String>, shares: Quantity) -> Self {
        Self {
            portfolio_id,
            ticker: ticker.into(),
            side: OrderSide::Buy,
            shares,
            price: None,
            stop_loss: None,
        }
    }

    /// A sell request.
    #[must_use]
    pub fn sell(portfolio_id: PortfolioId, ticker: impl Into<String>, shares: Quantity) -> Self {
        Self {
            side: OrderSide::Sell,
            ..Self::buy(portfolio_id, ticker, shares)
        }
    }

    /// Set the execution price.
    #[must_use]
    pub const fn at(mut self, price: Money) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the stop-loss.
    #[must_use]
    pub const fn with_stop_loss(mut self, stop_loss: Money) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    /// The proposal the validator checks.
    #[must_use]
    pub fn to_proposal(&self) -> TradeProposal {
        TradeProposal {
            ticker: self.ticker.clone(),
            side: self.side,
            shares: self.shares,
            price: self.price,
            stop_loss: self.stop_loss,
        }
    }
}

/// Outcome of a committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeResult {
    /// Portfolio changed.
    pub portfolio_id: PortfolioId,
    /// Cash after the change.
    pub new_cash_balance: Money,
    /// Position after the change; `None` when it was closed or never existed.
    pub updated_position: Option<Position>,
    /// The journal entry appended.
    pub journal_entry: TradeJournalEntry,
    /// Sequence the portfolio is now at.
    pub sequence_number: u64,
    /// Whether the commit also wrote a snapshot.
    pub snapshot_taken: bool,
}

impl TradeResult {
    /// Build from the committed state and its entry.
    #[must_use]
    pub fn committed(state: &PortfolioState, entry: TradeJournalEntry, snapshot_taken: bool) -> Self {
        let updated_position = entry
            .ticker
            .as_ref()
            .and_then(|ticker| state.position(ticker))
            .cloned();
        Self {
            portfolio_id: state.portfolio_id().clone(),
            new_cash_balance: state.cash(),
            updated_position,
            sequence_number: entry.sequence,
            journal_entry: entry,
            snapshot_taken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn request_deserializes_with_action_alias() {
        let json = r#"{
            "portfolio_id": "main",
            "ticker": "aapl",
            "action": "BUY",
            "shares": "10",
            "price": "150"
        }"#;
        let request: TradeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.side, OrderSide::Buy);
        assert_eq!(request.price, Some(Money::new(dec!(150))));
        assert!(request.stop_loss.is_none());
    }

    #[test]
    fn builder_produces_matching_proposal() {
        let request = TradeRequest::sell(PortfolioId::new("main"), "AAPL", Quantity::from_i64(5))
            .at(Money::new(dec!(160)));
        let proposal = request.to_proposal();
        assert_eq!(proposal.side, OrderSide::Sell);
        assert_eq!(proposal.shares, Quantity::from_i64(5));
        assert_eq!(proposal.price, Some(Money::new(dec!(160))));
    }
}
