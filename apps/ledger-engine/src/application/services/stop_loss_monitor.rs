//! Stop-Loss Monitor
//!
//! Checks every protected position against a current price and reports the
//! ones whose stop was breached. It never trades: triggered exits are handed
//! to [`TradeExecutor::execute_stop_exit`](crate::application::use_cases::TradeExecutor::execute_stop_exit).

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::PriceLookupPort;
use crate::domain::ledger::PortfolioState;
use crate::domain::shared::Clock;
use crate::domain::stop_enforcement::{StopCheck, StopScan, UnavailableQuote, evaluate_stop};

/// Stop monitor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopLossMonitorConfig {
    /// Oldest price a stop decision may rest on (default: 15 minutes).
    pub max_price_age: Duration,
}

impl Default for StopLossMonitorConfig {
    fn default() -> Self {
        Self {
            max_price_age: Duration::from_secs(15 * 60),
        }
    }
}

/// Advisory stop-loss scanner.
pub struct StopLossMonitor {
    config: StopLossMonitorConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StopLossMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopLossMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StopLossMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new(config: StopLossMonitorConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Settings in force.
    #[must_use]
    pub const fn config(&self) -> &StopLossMonitorConfig {
        &self.config
    }

    /// Scan `state` using `prices`.
    ///
    /// Positions without a stop are skipped without a lookup. A price older
    /// than the freshness threshold is reported as stale instead of being
    /// evaluated, and a failed lookup is reported as unavailable.
    pub async fn scan(&self, state: &PortfolioState, prices: &dyn PriceLookupPort) -> StopScan {
        let mut scan = StopScan::default();

        for position in state.positions().filter(|p| p.stop_loss.is_some()) {
            let observation = match prices.get_price(&position.ticker).await {
                Ok(observation) => observation,
                Err(e) => {
                    tracing::warn!(
                        portfolio_id = %state.portfolio_id(),
                        ticker = %position.ticker,
                        error = %e,
                        "Stop check skipped: no price"
                    );
                    scan.unavailable.push(UnavailableQuote {
                        ticker: position.ticker.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match evaluate_stop(
                position,
                observation.price,
                observation.as_of,
                self.clock.now(),
                self.config.max_price_age,
            ) {
                StopCheck::Triggered(exit) => {
                    tracing::info!(
                        portfolio_id = %state.portfolio_id(),
                        ticker = %exit.ticker,
                        price = %exit.trigger_price,
                        stop_loss = %exit.stop_loss,
                        "Stop-loss breached"
                    );
                    scan.triggered.push(exit);
                }
                StopCheck::Stale(stale) => {
                    tracing::warn!(
                        portfolio_id = %state.portfolio_id(),
                        ticker = %stale.ticker,
                        age_secs = stale.age.as_secs(),
                        "Stop check skipped: stale price"
                    );
                    scan.stale.push(stale);
                }
                StopCheck::Clear | StopCheck::Unprotected => {}
            }
        }

        scan
    }
}
