//! End-to-end trade flows through the wired engine.
//!
//! Every test builds a [`Container`] over in-memory storage and a scripted
//! price source, then drives it only through the public use cases.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use rust_decimal_macros::dec;

use ledger_engine::application::ports::PriceSourceError;
use ledger_engine::application::services::JournalQuery;
use ledger_engine::config::{Config, load_config_from_string};
use ledger_engine::domain::ledger::TradeAction;
use ledger_engine::domain::shared::ManualClock;
use ledger_engine::infrastructure::{InMemoryStorage, MockPriceSource};
use ledger_engine::{
    Container, EngineError, Money, PortfolioId, Quantity, Ticker, Timestamp, TradeRequest,
};

struct Harness {
    clock: Arc<ManualClock>,
    source: Arc<MockPriceSource>,
    engine: Container<InMemoryStorage, MockPriceSource>,
}

fn harness(config: Config) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Timestamp::parse("2026-01-05T15:00:00Z").unwrap(),
    ));
    let source = Arc::new(MockPriceSource::new(clock.clone()));
    let engine = Container::in_memory(config, source.clone(), clock.clone());
    Harness {
        clock,
        source,
        engine,
    }
}

fn fast_retries() -> Config {
    load_config_from_string(
        r"
market_data:
  retry:
    max_retries: 1
    initial_backoff_ms: 1
    max_backoff_ms: 2
",
    )
    .unwrap()
}

fn usd(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount)
}

fn ticker(raw: &str) -> Ticker {
    Ticker::parse(raw).unwrap()
}

#[tokio::test]
async fn open_add_and_close_a_position() {
    let h = harness(Config::default());
    let executor = h.engine.trade_executor();
    let queries = h.engine.query_use_case();
    let pid = PortfolioId::new("growth");

    executor.create_portfolio(&pid, usd(dec!(10000))).await.unwrap();

    let first = executor
        .execute(
            TradeRequest::buy(pid.clone(), "aapl", Quantity::from_i64(10))
                .at(usd(dec!(150)))
                .with_stop_loss(usd(dec!(140))),
        )
        .await
        .unwrap();
    assert_eq!(first.sequence_number, 1);
    assert_eq!(first.new_cash_balance, usd(dec!(8500)));
    let position = first.updated_position.unwrap();
    assert_eq!(position.ticker, ticker("AAPL"));
    assert_eq!(position.stop_loss, Some(usd(dec!(140))));

    h.clock.advance(std::time::Duration::from_secs(60));
    let second = executor
        .execute(TradeRequest::buy(pid.clone(), "AAPL", Quantity::from_i64(10)).at(usd(dec!(170))))
        .await
        .unwrap();
    let position = second.updated_position.unwrap();
    assert_eq!(position.shares, Quantity::from_i64(20));
    assert_eq!(position.average_cost, usd(dec!(160)));
    // A buy without a stop keeps the one in force.
    assert_eq!(position.stop_loss, Some(usd(dec!(140))));

    let closed = executor
        .execute(TradeRequest::sell(pid.clone(), "AAPL", Quantity::from_i64(20)).at(usd(dec!(165))))
        .await
        .unwrap();
    assert!(closed.updated_position.is_none());
    assert_eq!(closed.new_cash_balance, usd(dec!(10100)));
    assert_eq!(closed.journal_entry.realized_pnl, Some(usd(dec!(100))));

    let history = queries
        .trade_history(&pid, &JournalQuery::default())
        .await
        .unwrap();
    let actions: Vec<TradeAction> = history.iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![TradeAction::Sell, TradeAction::Buy, TradeAction::Buy]);

    let report = queries.verify_integrity(&pid).await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.issues);
    assert_eq!(report.journal_sequence, 3);
}

#[tokio::test]
async fn concurrent_buys_only_one_fits_the_cash() {
    let h = harness(Config::default());
    let executor = Arc::new(h.engine.trade_executor());
    let pid = PortfolioId::new("tight");
    executor.create_portfolio(&pid, usd(dec!(2000))).await.unwrap();

    let mut handles = Vec::new();
    for symbol in ["AAPL", "MSFT"] {
        let executor = Arc::clone(&executor);
        let request =
            TradeRequest::buy(pid.clone(), symbol, Quantity::from_i64(10)).at(usd(dec!(150)));
        handles.push(tokio::spawn(async move { executor.execute(request).await }));
    }

    let mut committed = 0;
    let mut refused = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(EngineError::InsufficientCash { required, available }) => {
                assert_eq!(required, usd(dec!(1500)));
                assert_eq!(available, usd(dec!(500)));
                refused += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((committed, refused), (1, 1));

    let state = executor.get_state(&pid).await.unwrap();
    assert_eq!(state.sequence(), 1);
    assert_eq!(state.cash(), usd(dec!(500)));
    assert_eq!(state.position_count(), 1);
}

#[tokio::test]
async fn gateway_price_is_used_when_none_is_given() {
    let h = harness(Config::default());
    h.source.set_price(&ticker("MSFT"), usd(dec!(412.5)));
    let executor = h.engine.trade_executor();
    let pid = PortfolioId::new("market");
    executor.create_portfolio(&pid, usd(dec!(5000))).await.unwrap();

    let result = executor
        .execute(TradeRequest::buy(pid.clone(), "MSFT", Quantity::from_i64(4)))
        .await
        .unwrap();
    assert_eq!(result.journal_entry.price, usd(dec!(412.5)));
    assert_eq!(result.new_cash_balance, usd(dec!(3350)));
    assert_eq!(h.source.calls_for(&ticker("MSFT")), 1);
}

#[tokio::test]
async fn price_outage_is_unconfirmed_and_changes_nothing() {
    let h = harness(fast_retries());
    h.source.fail_all(PriceSourceError::Transient {
        message: "connection reset".to_string(),
    });
    let executor = h.engine.trade_executor();
    let pid = PortfolioId::new("outage");
    executor.create_portfolio(&pid, usd(dec!(5000))).await.unwrap();

    let Err(err) = executor
        .execute(TradeRequest::buy(pid.clone(), "MSFT", Quantity::from_i64(1)))
        .await
    else {
        panic!("expected market data failure");
    };
    assert!(matches!(err, EngineError::MarketData(_)));
    assert!(err.is_unconfirmed());

    let state = executor.get_state(&pid).await.unwrap();
    assert_eq!(state.sequence(), 0);
    assert_eq!(state.cash(), usd(dec!(5000)));
}

#[tokio::test]
async fn triggered_stop_is_executed_explicitly() {
    let h = harness(Config::default());
    let aapl = ticker("AAPL");
    let executor = h.engine.trade_executor();
    let queries = h.engine.query_use_case();
    let pid = PortfolioId::new("protected");
    executor.create_portfolio(&pid, usd(dec!(10000))).await.unwrap();
    executor
        .execute(
            TradeRequest::buy(pid.clone(), "AAPL", Quantity::from_i64(10))
                .at(usd(dec!(150)))
                .with_stop_loss(usd(dec!(140))),
        )
        .await
        .unwrap();

    h.source.set_price(&aapl, usd(dec!(145)));
    let quiet = queries.scan_stops(&pid).await.unwrap();
    assert!(quiet.triggered.is_empty());

    h.source.set_price(&aapl, usd(dec!(138)));
    let scan = queries.scan_stops(&pid).await.unwrap();
    assert_eq!(scan.triggered.len(), 1);
    // The scan alone changes nothing.
    assert_eq!(queries.get_state(&pid).await.unwrap().sequence(), 1);

    let exit = executor
        .execute_stop_exit(&pid, &scan.triggered[0])
        .await
        .unwrap();
    assert_eq!(exit.journal_entry.action, TradeAction::StopExit);
    assert_eq!(exit.new_cash_balance, usd(dec!(9880)));
    assert!(exit.updated_position.is_none());

    // A second exit for the same trigger finds nothing to sell.
    let Err(err) = executor.execute_stop_exit(&pid, &scan.triggered[0]).await else {
        panic!("expected no position");
    };
    assert!(matches!(err, EngineError::NoPosition { .. }));
    assert!(err.is_rejection());
}

#[tokio::test]
async fn deposits_and_stop_updates_are_journaled() {
    let h = harness(Config::default());
    let executor = h.engine.trade_executor();
    let queries = h.engine.query_use_case();
    let pid = PortfolioId::new("funded");
    executor.create_portfolio(&pid, usd(dec!(1000))).await.unwrap();

    executor.deposit(&pid, usd(dec!(500))).await.unwrap();
    executor
        .execute(TradeRequest::buy(pid.clone(), "NVDA", Quantity::from_i64(10)).at(usd(dec!(120))))
        .await
        .unwrap();
    let update = executor
        .set_stop_loss(&pid, "nvda", Some(usd(dec!(110))))
        .await
        .unwrap();
    assert_eq!(update.journal_entry.action, TradeAction::StopUpdate);
    assert_eq!(update.new_cash_balance, usd(dec!(300)));

    let rebuilt = queries.state_at(&pid, 3).await.unwrap();
    assert_eq!(
        rebuilt.position(&ticker("NVDA")).unwrap().stop_loss,
        Some(usd(dec!(110)))
    );
    let before_buy = queries.state_at(&pid, 1).await.unwrap();
    assert_eq!(before_buy.cash(), usd(dec!(1500)));
    assert_eq!(before_buy.position_count(), 0);
}

#[tokio::test]
async fn creating_twice_is_refused() {
    let h = harness(Config::default());
    let executor = h.engine.trade_executor();
    let pid = PortfolioId::new("once");
    executor.create_portfolio(&pid, usd(dec!(100))).await.unwrap();

    let Err(err) = executor.create_portfolio(&pid, usd(dec!(100))).await else {
        panic!("expected duplicate");
    };
    assert_eq!(err.code(), "PORTFOLIO_EXISTS");
    assert!(err.is_rejection());
}
