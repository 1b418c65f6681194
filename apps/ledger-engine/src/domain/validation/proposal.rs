//! Trade proposals before and after validation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::{Money, Quantity, Ticker};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy shares with cash.
    Buy,
    /// Sell held shares for cash.
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A trade as requested, not yet checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeProposal {
    /// Raw ticker text.
    pub ticker: String,
    /// Buy or sell.
    pub side: OrderSide,
    /// Shares to trade.
    pub shares: Quantity,
    /// Execution price, once known.
    pub price: Option<Money>,
    /// Stop-loss to set on the position.
    pub stop_loss: Option<Money>,
}

impl TradeProposal {
    /// The same proposal priced at `price`.
    #[must_use]
    pub fn priced(&self, price: Money) -> Self {
        Self {
            price: Some(price),
            ..self.clone()
        }
    }
}

/// A trade that passed every rule against a specific state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTrade {
    /// Normalized ticker.
    pub ticker: Ticker,
    /// Buy or sell.
    pub side: OrderSide,
    /// Shares to trade.
    pub shares: Quantity,
    /// Execution price.
    pub price: Money,
    /// Stop-loss to set on the position.
    pub stop_loss: Option<Money>,
    /// `shares × price`.
    pub notional: Money,
}
