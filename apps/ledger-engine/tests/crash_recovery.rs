//! Recovery of the file store after interrupted writers.
//!
//! Each test leaves the on-disk layout the way a crash at some point of the
//! commit protocol would, then checks what the next process sees.

#![allow(clippy::unwrap_used)]

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;

use ledger_engine::application::ports::StoragePort;
use ledger_engine::config::{Config, load_config_from_string};
use ledger_engine::domain::ledger::apply_deposit;
use ledger_engine::domain::shared::{Clock, ManualClock};
use ledger_engine::infrastructure::{FileStorage, MockPriceSource};
use ledger_engine::{Container, EngineError, Money, PortfolioId, Quantity, Timestamp, TradeRequest};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Timestamp::parse("2026-01-05T15:00:00Z").unwrap(),
    ))
}

fn config(root: &Path) -> Config {
    let mut config = load_config_from_string(
        r"
persistence:
  lock_timeout_ms: 100
  lease_secs: 30
  poll_interval_ms: 5
executor:
  max_attempts: 2
  conflict_backoff_ms: 1
  max_conflict_backoff_ms: 2
",
    )
    .unwrap();
    config.persistence.data_dir = root.display().to_string();
    config
}

fn open(root: &Path, clock: &Arc<ManualClock>) -> Container<FileStorage, MockPriceSource> {
    let source = Arc::new(MockPriceSource::new(clock.clone()));
    Container::with_file_storage(config(root), source, clock.clone())
}

fn usd(amount: rust_decimal::Decimal) -> Money {
    Money::new(amount)
}

async fn seeded(
    root: &Path,
    clock: &Arc<ManualClock>,
) -> (Container<FileStorage, MockPriceSource>, PortfolioId) {
    let engine = open(root, clock);
    let pid = PortfolioId::new("main");
    let executor = engine.trade_executor();
    executor.create_portfolio(&pid, usd(dec!(10000))).await.unwrap();
    executor
        .execute(TradeRequest::buy(pid.clone(), "AAPL", Quantity::from_i64(10)).at(usd(dec!(150))))
        .await
        .unwrap();
    (engine, pid)
}

fn journal_lines(root: &Path, pid: &PortfolioId) -> Vec<String> {
    std::fs::read_to_string(root.join(pid.as_str()).join("journal.jsonl"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let (engine, pid) = seeded(dir.path(), &clock).await;
    drop(engine);

    let reopened = open(dir.path(), &clock);
    let state = reopened.query_use_case().get_state(&pid).await.unwrap();
    assert_eq!(state.sequence(), 1);
    assert_eq!(state.cash(), usd(dec!(8500)));
}

#[tokio::test]
async fn journal_ahead_of_state_is_replayed_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let (engine, pid) = seeded(dir.path(), &clock).await;

    // A writer that appended its journal entry and died before replacing
    // the materialized state.
    let storage = engine.persistence().storage().clone();
    let before = engine.query_use_case().get_state(&pid).await.unwrap();
    let (_, entry) = apply_deposit(&before, usd(dec!(250)), clock.now()).unwrap();
    let token = storage
        .acquire_lock(&pid, Duration::from_secs(1))
        .await
        .unwrap();
    storage.append_journal(&token, &entry).await.unwrap();
    storage.release_lock(&token).await.unwrap();

    let queries = engine.query_use_case();
    let state = queries.get_state(&pid).await.unwrap();
    assert_eq!(state.sequence(), 2);
    assert_eq!(state.cash(), usd(dec!(8750)));

    let report = queries.verify_integrity(&pid).await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.issues);
    assert_eq!(report.pending_entries, 1);

    // The next commit continues from the replayed head.
    let next = engine
        .trade_executor()
        .deposit(&pid, usd(dec!(50)))
        .await
        .unwrap();
    assert_eq!(next.sequence_number, 3);
    assert_eq!(next.new_cash_balance, usd(dec!(8800)));
    assert_eq!(queries.verify_integrity(&pid).await.unwrap().pending_entries, 0);
}

#[tokio::test]
async fn torn_journal_tail_is_ignored_then_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let (engine, pid) = seeded(dir.path(), &clock).await;

    let journal = dir.path().join(pid.as_str()).join("journal.jsonl");
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&journal)
        .unwrap();
    file.write_all(br#"{"sequence":2,"portfolio_id":"main","act"#)
        .unwrap();
    drop(file);

    let queries = engine.query_use_case();
    assert_eq!(queries.get_state(&pid).await.unwrap().sequence(), 1);

    engine
        .trade_executor()
        .deposit(&pid, usd(dec!(100)))
        .await
        .unwrap();

    let lines = journal_lines(dir.path(), &pid);
    assert_eq!(lines.len(), 2);
    for line in &lines {
        serde_json::from_str::<serde_json::Value>(line).unwrap();
    }
    assert!(std::fs::read_to_string(&journal).unwrap().ends_with('\n'));
    let report = queries.verify_integrity(&pid).await.unwrap();
    assert!(report.is_consistent(), "{:?}", report.issues);
}

#[tokio::test]
async fn leftover_temp_files_are_never_read() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let (engine, pid) = seeded(dir.path(), &clock).await;

    let portfolio_dir = dir.path().join(pid.as_str());
    std::fs::write(
        portfolio_dir.join(".state.json.tmp-0b5e7c1d"),
        b"{\"format_version\":1,\"cash\":\"-1",
    )
    .unwrap();

    let queries = engine.query_use_case();
    let state = queries.get_state(&pid).await.unwrap();
    assert_eq!(state.cash(), usd(dec!(8500)));
    assert!(queries.verify_integrity(&pid).await.unwrap().is_consistent());
}

#[tokio::test]
async fn expired_lease_of_a_dead_writer_is_broken() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let (engine, pid) = seeded(dir.path(), &clock).await;

    // A writer takes the lock and never comes back.
    let storage = engine.persistence().storage().clone();
    let _abandoned = storage
        .acquire_lock(&pid, Duration::from_secs(1))
        .await
        .unwrap();

    let executor = engine.trade_executor();
    let Err(err) = executor.deposit(&pid, usd(dec!(10))).await else {
        panic!("expected lock timeout while the lease is live");
    };
    assert!(matches!(err, EngineError::LockTimeout { .. }));
    assert!(err.is_unconfirmed());
    assert_eq!(executor.get_state(&pid).await.unwrap().sequence(), 1);

    clock.advance(Duration::from_secs(31));
    let result = executor.deposit(&pid, usd(dec!(10))).await.unwrap();
    assert_eq!(result.sequence_number, 2);
}

#[tokio::test]
async fn corrupt_state_is_an_unconfirmed_failure() {
    let dir = tempfile::tempdir().unwrap();
    let clock = clock();
    let (engine, pid) = seeded(dir.path(), &clock).await;

    std::fs::write(dir.path().join(pid.as_str()).join("state.json"), b"not json").unwrap();

    let Err(err) = engine.query_use_case().get_state(&pid).await else {
        panic!("expected corrupt record");
    };
    assert_eq!(err.code(), "CORRUPT_RECORD");
    assert!(err.is_unconfirmed());
}
