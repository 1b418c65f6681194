//! Dependency Injection Container
//!
//! Wires storage, price source and clock into the engine's services and use
//! cases according to a [`Config`].

use std::sync::Arc;

use crate::application::ports::{PriceSourcePort, StoragePort};
use crate::application::services::{MarketDataGateway, PersistenceManager, StopLossMonitor};
use crate::application::use_cases::{QueryPortfolioUseCase, TradeExecutor};
use crate::config::Config;
use crate::domain::shared::Clock;
use crate::domain::validation::Validator;
use crate::infrastructure::persistence::{FileStorage, InMemoryStorage};

/// Dependency injection container.
///
/// Owns one persistence manager and one market data gateway. Every use case
/// built from the same container shares them, so the gateway's cache and
/// breaker see all lookups.
pub struct Container<S, P>
where
    S: StoragePort + 'static,
    P: PriceSourcePort + 'static,
{
    config: Config,
    persistence: Arc<PersistenceManager<S>>,
    gateway: Arc<MarketDataGateway<P>>,
    clock: Arc<dyn Clock>,
}

impl<S, P> std::fmt::Debug for Container<S, P>
where
    S: StoragePort + 'static,
    P: PriceSourcePort + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl<S, P> Container<S, P>
where
    S: StoragePort + 'static,
    P: PriceSourcePort + 'static,
{
    /// Create a container over the given storage and price source.
    pub fn new(config: Config, storage: Arc<S>, source: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        let persistence = Arc::new(PersistenceManager::new(
            storage,
            config.persistence.to_manager_config(),
            Arc::clone(&clock),
        ));
        let gateway = Arc::new(MarketDataGateway::new(
            source,
            config.market_data.to_gateway_config(),
            Arc::clone(&clock),
        ));
        Self {
            config,
            persistence,
            gateway,
            clock,
        }
    }

    /// Configuration the container was built from.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Get the persistence manager.
    pub fn persistence(&self) -> Arc<PersistenceManager<S>> {
        Arc::clone(&self.persistence)
    }

    /// Get the market data gateway.
    pub fn gateway(&self) -> Arc<MarketDataGateway<P>> {
        Arc::clone(&self.gateway)
    }

    /// Create a `TradeExecutor`.
    pub fn trade_executor(&self) -> TradeExecutor<S, MarketDataGateway<P>> {
        TradeExecutor::new(
            Arc::clone(&self.persistence),
            Arc::clone(&self.gateway),
            Validator::new(self.config.validation.to_limits()),
            self.config.executor.to_executor_config(),
            Arc::clone(&self.clock),
        )
    }

    /// Create a `StopLossMonitor`.
    pub fn stop_loss_monitor(&self) -> StopLossMonitor {
        StopLossMonitor::new(self.config.stops.to_monitor_config(), Arc::clone(&self.clock))
    }

    /// Create a `QueryPortfolioUseCase`.
    pub fn query_use_case(&self) -> QueryPortfolioUseCase<S, MarketDataGateway<P>> {
        QueryPortfolioUseCase::new(
            Arc::clone(&self.persistence),
            Arc::clone(&self.gateway),
            self.stop_loss_monitor(),
            Arc::clone(&self.clock),
        )
    }
}

impl<P> Container<FileStorage, P>
where
    P: PriceSourcePort + 'static,
{
    /// Container over a [`FileStorage`] rooted at `persistence.data_dir`.
    pub fn with_file_storage(config: Config, source: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        let storage = Arc::new(FileStorage::new(
            config.persistence.to_file_storage_config(),
            Arc::clone(&clock),
        ));
        Self::new(config, storage, source, clock)
    }
}

impl<P> Container<InMemoryStorage, P>
where
    P: PriceSourcePort + 'static,
{
    /// Container over a fresh [`InMemoryStorage`].
    pub fn in_memory(config: Config, source: Arc<P>, clock: Arc<dyn Clock>) -> Self {
        let storage = Arc::new(InMemoryStorage::new(
            Arc::clone(&clock),
            config.persistence.lease_duration(),
        ));
        Self::new(config, storage, source, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::TradeRequest;
    use crate::config::load_config_from_string;
    use crate::domain::shared::{ManualClock, Money, PortfolioId, Quantity, Ticker, Timestamp};
    use crate::infrastructure::price_feed::MockPriceSource;
    use rust_decimal_macros::dec;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Timestamp::parse("2026-01-05T15:00:00Z").unwrap(),
        ))
    }

    #[tokio::test]
    async fn configured_limits_reach_the_executor() {
        let config = load_config_from_string(
            r"
validation:
  max_notional: 1000
",
        )
        .unwrap();
        let clock = clock();
        let source = Arc::new(MockPriceSource::new(clock.clone()));
        let container = Container::in_memory(config, source, clock);
        let executor = container.trade_executor();

        let pid = PortfolioId::new("capped");
        executor
            .create_portfolio(&pid, Money::new(dec!(10000)))
            .await
            .unwrap();

        let request = TradeRequest::buy(pid.clone(), "AAPL", Quantity::from_i64(10))
            .at(Money::new(dec!(150)));
        let Err(err) = executor.execute(request).await else {
            panic!("expected notional limit");
        };
        assert_eq!(err.code(), "NOTIONAL_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn use_cases_share_the_gateway() {
        let clock = clock();
        let source = Arc::new(MockPriceSource::new(clock.clone()));
        let aapl = Ticker::parse("AAPL").unwrap();
        source.set_price(&aapl, Money::new(dec!(150)));
        let container = Container::in_memory(Config::default(), source.clone(), clock);

        let pid = PortfolioId::new("shared");
        let executor = container.trade_executor();
        executor
            .create_portfolio(&pid, Money::new(dec!(10000)))
            .await
            .unwrap();
        executor
            .execute(TradeRequest::buy(pid.clone(), "AAPL", Quantity::from_i64(10)))
            .await
            .unwrap();

        let summary = container.query_use_case().summary(&pid).await.unwrap();
        assert_eq!(summary.valuation.total_equity, Money::new(dec!(10000)));
        assert_eq!(source.call_count(), 2);
        assert_eq!(container.gateway().breaker_metrics().consecutive_failures, 0);
    }

    #[test]
    fn file_storage_rooted_at_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.persistence.data_dir = dir.path().display().to_string();
        let clock = clock();
        let source = Arc::new(MockPriceSource::new(clock.clone()));
        let container = Container::with_file_storage(config, source, clock);
        assert_eq!(container.persistence().storage().root(), dir.path());

        let pid = PortfolioId::new("on-disk");
        let executor = container.trade_executor();
        tokio_test::assert_ok!(tokio_test::block_on(
            executor.create_portfolio(&pid, Money::new(dec!(100)))
        ));
        assert!(dir.path().join("on-disk").join("state.json").is_file());
    }
}
