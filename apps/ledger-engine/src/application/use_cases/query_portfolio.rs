//! Query Portfolio Use Case
//!
//! Read-only operations for dashboards and automation. Nothing here takes
//! the portfolio lock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::application::dto::PortfolioSummary;
use crate::application::ports::{PriceLookupPort, StoragePort};
use crate::application::services::{IntegrityReport, JournalQuery, PersistenceManager, StopLossMonitor};
use crate::domain::ledger::{PortfolioState, TradeJournalEntry, valuate};
use crate::domain::shared::{Clock, PortfolioId};
use crate::domain::stop_enforcement::StopScan;
use crate::error::EngineError;

/// Use case for reading portfolio state, history and stop status.
pub struct QueryPortfolioUseCase<S, L>
where
    S: StoragePort,
    L: PriceLookupPort,
{
    persistence: Arc<PersistenceManager<S>>,
    prices: Arc<L>,
    monitor: StopLossMonitor,
    clock: Arc<dyn Clock>,
}

impl<S, L> std::fmt::Debug for QueryPortfolioUseCase<S, L>
where
    S: StoragePort,
    L: PriceLookupPort,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPortfolioUseCase")
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl<S, L> QueryPortfolioUseCase<S, L>
where
    S: StoragePort,
    L: PriceLookupPort,
{
    /// Create a new QueryPortfolioUseCase.
    pub fn new(
        persistence: Arc<PersistenceManager<S>>,
        prices: Arc<L>,
        monitor: StopLossMonitor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            persistence,
            prices,
            monitor,
            clock,
        }
    }

    /// Current committed state.
    pub async fn get_state(&self, portfolio_id: &PortfolioId) -> Result<PortfolioState, EngineError> {
        Ok(self.persistence.load(portfolio_id).await?)
    }

    /// State as of journal `sequence`.
    pub async fn state_at(
        &self,
        portfolio_id: &PortfolioId,
        sequence: u64,
    ) -> Result<PortfolioState, EngineError> {
        Ok(self.persistence.state_at(portfolio_id, sequence).await?)
    }

    /// Trade history, newest first.
    pub async fn trade_history(
        &self,
        portfolio_id: &PortfolioId,
        query: &JournalQuery,
    ) -> Result<Vec<TradeJournalEntry>, EngineError> {
        Ok(self.persistence.journal(portfolio_id, query).await?)
    }

    /// Mark-to-market summary.
    ///
    /// Prices may be stale here; display tolerates them. A position without
    /// any price is valued at cost and listed in `unpriced_tickers`.
    pub async fn summary(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSummary, EngineError> {
        let state = self.persistence.load(portfolio_id).await?;

        let mut prices = HashMap::new();
        let mut stale_tickers = Vec::new();
        let mut unpriced_tickers = Vec::new();
        for position in state.positions() {
            match self.prices.get_price(&position.ticker).await {
                Ok(observation) => {
                    if observation.stale {
                        stale_tickers.push(position.ticker.clone());
                    }
                    prices.insert(position.ticker.clone(), observation.price);
                }
                Err(e) => {
                    tracing::debug!(
                        portfolio_id = %portfolio_id,
                        ticker = %position.ticker,
                        error = %e,
                        "Valuing position at cost"
                    );
                    unpriced_tickers.push(position.ticker.clone());
                }
            }
        }

        Ok(PortfolioSummary {
            portfolio_id: portfolio_id.clone(),
            sequence: state.sequence(),
            created_at: state.created_at(),
            updated_at: state.updated_at(),
            valuation: valuate(&state, &prices),
            stale_tickers,
            unpriced_tickers,
            generated_at: self.clock.now(),
        })
    }

    /// Check every protected position against current prices.
    ///
    /// Advisory only: triggered exits are executed through
    /// [`TradeExecutor::execute_stop_exit`](super::TradeExecutor::execute_stop_exit).
    pub async fn scan_stops(&self, portfolio_id: &PortfolioId) -> Result<StopScan, EngineError> {
        let state = self.persistence.load(portfolio_id).await?;
        Ok(self.monitor.scan(&state, self.prices.as_ref()).await)
    }

    /// Cross-check materialized state, journal and snapshots.
    pub async fn verify_integrity(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<IntegrityReport, EngineError> {
        Ok(self.persistence.verify_integrity(portfolio_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MarketDataError, PriceObservation, PriceOrigin};
    use crate::application::services::{PersistenceConfig, StopLossMonitorConfig};
    use crate::domain::ledger::{apply_buy, apply_deposit};
    use crate::domain::shared::{ManualClock, Money, Quantity, Ticker, Timestamp};
    use crate::infrastructure::persistence::InMemoryStorage;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct OnePrice {
        ticker: Ticker,
        observation: PriceObservation,
    }

    #[async_trait]
    impl PriceLookupPort for OnePrice {
        async fn get_price(&self, ticker: &Ticker) -> Result<PriceObservation, MarketDataError> {
            if *ticker == self.ticker {
                Ok(self.observation.clone())
            } else {
                Err(MarketDataError::NotFound {
                    ticker: ticker.clone(),
                })
            }
        }
    }

    fn t(raw: &str) -> Ticker {
        Ticker::parse(raw).unwrap()
    }

    fn usd(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount)
    }

    async fn setup(
        observation: PriceObservation,
    ) -> (QueryPortfolioUseCase<InMemoryStorage, OnePrice>, PortfolioId) {
        let clock = Arc::new(ManualClock::new(
            Timestamp::parse("2026-01-05T15:00:00Z").unwrap(),
        ));
        let storage = Arc::new(InMemoryStorage::new(clock.clone(), Duration::from_secs(30)));
        let persistence = Arc::new(PersistenceManager::new(
            storage,
            PersistenceConfig::default(),
            clock.clone(),
        ));
        let pid = PortfolioId::new("main");
        let genesis = persistence
            .create_portfolio(&pid, usd(dec!(10000)))
            .await
            .unwrap();

        let at = clock.now();
        let (s1, e1) = apply_buy(
            &genesis,
            &t("AAPL"),
            Quantity::from_i64(10),
            usd(dec!(150)),
            Some(usd(dec!(140))),
            at,
        )
        .unwrap();
        persistence.commit(&pid, 0, &s1, &e1).await.unwrap();
        let (s2, e2) = apply_buy(&s1, &t("MSFT"), Quantity::from_i64(2), usd(dec!(400)), None, at)
            .unwrap();
        persistence.commit(&pid, 1, &s2, &e2).await.unwrap();
        let (s3, e3) = apply_deposit(&s2, usd(dec!(100)), at).unwrap();
        persistence.commit(&pid, 2, &s3, &e3).await.unwrap();

        let use_case = QueryPortfolioUseCase::new(
            persistence,
            Arc::new(OnePrice {
                ticker: t("AAPL"),
                observation,
            }),
            StopLossMonitor::new(StopLossMonitorConfig::default(), clock.clone()),
            clock,
        );
        (use_case, pid)
    }

    fn aapl_at(price: Money, stale: bool) -> PriceObservation {
        PriceObservation {
            ticker: t("AAPL"),
            price,
            as_of: Timestamp::parse("2026-01-05T15:00:00Z").unwrap(),
            origin: if stale {
                PriceOrigin::Cache
            } else {
                PriceOrigin::Live
            },
            stale,
        }
    }

    #[tokio::test]
    async fn summary_marks_priced_and_unpriced_positions() {
        let (queries, pid) = setup(aapl_at(usd(dec!(160)), true)).await;
        let summary = queries.summary(&pid).await.unwrap();

        assert_eq!(summary.sequence, 3);
        assert_eq!(summary.stale_tickers, vec![t("AAPL")]);
        assert_eq!(summary.unpriced_tickers, vec![t("MSFT")]);
        // Cash 10000 - 1500 - 800 + 100, AAPL at 160, MSFT at cost.
        assert_eq!(summary.valuation.cash, usd(dec!(7800)));
        assert_eq!(summary.valuation.unrealized_pnl, usd(dec!(100)));
        assert_eq!(summary.valuation.total_equity, usd(dec!(10200)));
    }

    #[tokio::test]
    async fn trade_history_filters_and_orders_newest_first() {
        let (queries, pid) = setup(aapl_at(usd(dec!(160)), false)).await;

        let all = queries
            .trade_history(&pid, &JournalQuery::default())
            .await
            .unwrap();
        let sequences: Vec<u64> = all.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 2, 1]);

        let msft = queries
            .trade_history(
                &pid,
                &JournalQuery {
                    ticker: Some(t("MSFT")),
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(msft.len(), 1);
        assert_eq!(msft[0].sequence, 2);
    }

    #[tokio::test]
    async fn state_at_earlier_sequence() {
        let (queries, pid) = setup(aapl_at(usd(dec!(160)), false)).await;
        let state = queries.state_at(&pid, 1).await.unwrap();
        assert_eq!(state.cash(), usd(dec!(8500)));
        assert_eq!(state.position_count(), 1);

        let beyond = queries.state_at(&pid, 9).await;
        assert!(matches!(beyond, Err(EngineError::SequenceOutOfRange { head: 3, .. })));
    }

    #[tokio::test]
    async fn scan_stops_flags_breach() {
        let (queries, pid) = setup(aapl_at(usd(dec!(138)), false)).await;
        let scan = queries.scan_stops(&pid).await.unwrap();
        assert_eq!(scan.triggered.len(), 1);
        assert_eq!(scan.triggered[0].ticker, t("AAPL"));
        // MSFT carries no stop, so it is never looked up.
        assert!(scan.unavailable.is_empty());
    }

    #[tokio::test]
    async fn integrity_of_fresh_history() {
        let (queries, pid) = setup(aapl_at(usd(dec!(160)), false)).await;
        let report = queries.verify_integrity(&pid).await.unwrap();
        assert!(report.is_consistent(), "{:?}", report.issues);
        assert_eq!(report.journal_sequence, 3);
    }
}
