//! Portfolio DTOs

use serde::{Deserialize, Serialize};

use crate::domain::ledger::PortfolioValuation;
use crate::domain::shared::{PortfolioId, Ticker, Timestamp};

/// Read-only view of a portfolio for dashboards and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Portfolio.
    pub portfolio_id: PortfolioId,
    /// Committed sequence the summary reflects.
    pub sequence: u64,
    /// When the portfolio was created.
    pub created_at: Timestamp,
    /// When it last changed.
    pub updated_at: Timestamp,
    /// Mark-to-market figures.
    pub valuation: PortfolioValuation,
    /// Tickers valued from a cached price.
    pub stale_tickers: Vec<Ticker>,
    /// Tickers without any price, valued at cost.
    pub unpriced_tickers: Vec<Ticker>,
    /// When the summary was produced.
    pub generated_at: Timestamp,
}
