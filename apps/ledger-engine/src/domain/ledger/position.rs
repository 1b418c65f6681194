//! Open position within a portfolio.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Money, Quantity, Ticker, Timestamp};

/// Decimal places kept on the weighted average cost.
pub const AVERAGE_COST_DP: u32 = 8;

/// Holding of one ticker.
///
/// A position only exists while `shares > 0`; reducing it to zero removes it
/// from the portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Ticker held.
    pub ticker: Ticker,
    /// Shares held (fractional allowed).
    pub shares: Quantity,
    /// Weighted average cost per share.
    pub average_cost: Money,
    /// Price at or below which the position should be exited.
    pub stop_loss: Option<Money>,
    /// When the position was first opened.
    pub opened_at: Timestamp,
}

impl Position {
    /// Total cost of the shares held.
    #[must_use]
    pub fn cost_basis(&self) -> Money {
        self.average_cost * self.shares.amount()
    }

    /// Value of the shares at `price`.
    #[must_use]
    pub fn market_value(&self, price: Money) -> Money {
        price * self.shares.amount()
    }

    /// Unrealized gain or loss at `price`.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Money) -> Money {
        self.market_value(price) - self.cost_basis()
    }

    /// Whether `price` has breached the stop-loss.
    #[must_use]
    pub fn stop_breached(&self, price: Money) -> bool {
        self.stop_loss.is_some_and(|stop| price <= stop)
    }

    /// The position after buying `shares` more at `price`.
    ///
    /// The average cost becomes the share-weighted mean of the old cost and
    /// the new price.
    pub(crate) fn accumulate(&self, shares: Quantity, price: Money) -> Self {
        let total = self.shares + shares;
        let weighted = self.cost_basis() + price * shares.amount();
        let average = weighted
            .checked_div(total.amount())
            .map_or(price, |avg| Money::new(avg.amount().round_dp(AVERAGE_COST_DP)));
        Self {
            shares: total,
            average_cost: average,
            ..self.clone()
        }
    }

    /// Percentage gain at `price` relative to average cost.
    #[must_use]
    pub fn return_pct(&self, price: Money) -> Option<Decimal> {
        let cost = self.cost_basis();
        if cost.is_zero() {
            return None;
        }
        self.unrealized_pnl(price)
            .amount()
            .checked_div(cost.amount())
            .map(|r| (r * Decimal::ONE_HUNDRED).round_dp(2))
    }
}
