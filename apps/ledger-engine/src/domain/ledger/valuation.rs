//! Mark-to-market valuation of a portfolio state.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::PortfolioState;
use crate::domain::shared::{Money, Quantity, Ticker};

/// Valuation of one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionValuation {
    /// Ticker held.
    pub ticker: Ticker,
    /// Shares held.
    pub shares: Quantity,
    /// Average cost per share.
    pub average_cost: Money,
    /// Price used for the valuation.
    pub price: Money,
    /// False when no price was available and average cost stood in.
    pub priced: bool,
    /// `shares × price`.
    pub market_value: Money,
    /// Market value less cost basis.
    pub unrealized_pnl: Money,
    /// Unrealized P&L as a percentage of cost basis.
    pub return_pct: Option<Decimal>,
    /// Stop-loss, if set.
    pub stop_loss: Option<Money>,
}

/// Valuation of a whole portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    /// Cash on hand.
    pub cash: Money,
    /// Per-position detail, ordered by ticker.
    pub positions: Vec<PositionValuation>,
    /// Sum of position market values.
    pub market_value: Money,
    /// Sum of position cost bases.
    pub cost_basis: Money,
    /// Market value less cost basis.
    pub unrealized_pnl: Money,
    /// Cash plus market value.
    pub total_equity: Money,
}

/// Value `state` at `prices`.
///
/// A ticker missing from `prices` is valued at its average cost, so it
/// contributes no unrealized P&L.
#[must_use]
pub fn valuate(state: &PortfolioState, prices: &HashMap<Ticker, Money>) -> PortfolioValuation {
    let positions: Vec<PositionValuation> = state
        .positions()
        .map(|p| {
            let (price, priced) = prices
                .get(&p.ticker)
                .map_or((p.average_cost, false), |price| (*price, true));
            PositionValuation {
                ticker: p.ticker.clone(),
                shares: p.shares,
                average_cost: p.average_cost,
                price,
                priced,
                market_value: p.market_value(price),
                unrealized_pnl: p.unrealized_pnl(price),
                return_pct: p.return_pct(price),
                stop_loss: p.stop_loss,
            }
        })
        .collect();

    let market_value: Money = positions.iter().map(|p| p.market_value).sum();
    let cost_basis: Money = state.positions().map(|p| p.cost_basis()).sum();
    PortfolioValuation {
        cash: state.cash(),
        market_value,
        cost_basis,
        unrealized_pnl: market_value - cost_basis,
        total_equity: state.cash() + market_value,
        positions,
    }
}
