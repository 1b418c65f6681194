//! Two engines over one data directory.
//!
//! Each engine has its own `FileStorage`, so nothing in memory is shared and
//! the lease file is the only thing keeping their commits apart, the same as
//! two processes.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;

use rust_decimal_macros::dec;

use ledger_engine::config::{Config, load_config_from_string};
use ledger_engine::domain::shared::ManualClock;
use ledger_engine::infrastructure::{FileStorage, MockPriceSource};
use ledger_engine::{Container, Money, PortfolioId, Quantity, Timestamp, TradeRequest};

const BUYS_PER_ENGINE: usize = 8;

fn config(root: &Path) -> Config {
    let mut config = load_config_from_string(
        r"
persistence:
  lock_timeout_ms: 5000
  poll_interval_ms: 2
executor:
  max_attempts: 20
  conflict_backoff_ms: 1
  max_conflict_backoff_ms: 10
",
    )
    .unwrap();
    config.persistence.data_dir = root.display().to_string();
    config
}

fn engine(root: &Path, clock: &Arc<ManualClock>) -> Container<FileStorage, MockPriceSource> {
    let source = Arc::new(MockPriceSource::new(clock.clone()));
    Container::with_file_storage(config(root), source, clock.clone())
}

fn usd(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_buys_from_two_stores_all_land_once() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(
        Timestamp::parse("2026-01-05T15:00:00Z").unwrap(),
    ));
    let first = engine(dir.path(), &clock);
    let second = engine(dir.path(), &clock);
    let pid = PortfolioId::new("shared");
    first
        .trade_executor()
        .create_portfolio(&pid, usd(dec!(1000)))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for (engine, symbol) in [(&first, "AAPL"), (&second, "MSFT")] {
        let executor = Arc::new(engine.trade_executor());
        for _ in 0..BUYS_PER_ENGINE {
            let executor = Arc::clone(&executor);
            let request =
                TradeRequest::buy(pid.clone(), symbol, Quantity::from_i64(1)).at(usd(dec!(60)));
            handles.push(tokio::spawn(async move { executor.execute(request).await }));
        }
    }

    let mut sequences = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        sequences.push(result.sequence_number);
    }
    sequences.sort_unstable();
    let expected: Vec<u64> = (1..=2 * BUYS_PER_ENGINE as u64).collect();
    assert_eq!(sequences, expected);

    // Either store reads the same history.
    for engine in [&first, &second] {
        let queries = engine.query_use_case();
        let state = queries.get_state(&pid).await.unwrap();
        assert_eq!(state.sequence(), 16);
        assert_eq!(state.cash(), usd(dec!(40)));
        assert_eq!(state.position_count(), 2);

        let report = queries.verify_integrity(&pid).await.unwrap();
        assert!(report.is_consistent(), "{:?}", report.issues);
        assert_eq!(report.journal_sequence, 16);
    }
}
