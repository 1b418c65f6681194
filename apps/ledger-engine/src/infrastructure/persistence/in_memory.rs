//! In-memory storage backend for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{LockToken, PersistedState, StorageError, StoragePort};
use crate::domain::ledger::{Snapshot, TradeJournalEntry};
use crate::domain::shared::{Clock, LockId, PortfolioId};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[derive(Debug, Default)]
struct Portfolio {
    lease: Option<LockToken>,
    state: Option<PersistedState>,
    journal: Vec<TradeJournalEntry>,
    snapshots: BTreeMap<u64, Snapshot>,
}

/// In-memory implementation of `StoragePort`.
///
/// Same lease semantics as the file store, without durability. Suitable for
/// testing and development. Not for production use.
pub struct InMemoryStorage {
    clock: Arc<dyn Clock>,
    lease_duration: Duration,
    portfolios: Mutex<HashMap<PortfolioId, Portfolio>>,
    failing_state_writes: AtomicU32,
    failing_appends: AtomicU32,
}

impl std::fmt::Debug for InMemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStorage")
            .field("lease_duration", &self.lease_duration)
            .finish_non_exhaustive()
    }
}

impl InMemoryStorage {
    /// Create an empty store granting leases of `lease_duration`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, lease_duration: Duration) -> Self {
        Self {
            clock,
            lease_duration,
            portfolios: Mutex::new(HashMap::new()),
            failing_state_writes: AtomicU32::new(0),
            failing_appends: AtomicU32::new(0),
        }
    }

    /// Make the next `count` state writes fail, simulating a crash after the
    /// journal append.
    pub fn fail_state_writes(&self, count: u32) {
        self.failing_state_writes.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` journal appends fail.
    pub fn fail_journal_appends(&self, count: u32) {
        self.failing_appends.store(count, Ordering::SeqCst);
    }

    /// Journal length for a portfolio.
    #[must_use]
    pub fn journal_len(&self, portfolio_id: &PortfolioId) -> usize {
        self.with(portfolio_id, |p| p.journal.len())
    }

    /// Whether an unexpired lease is held on the portfolio.
    #[must_use]
    pub fn is_locked(&self, portfolio_id: &PortfolioId) -> bool {
        let now = self.clock.now();
        self.with(portfolio_id, |p| {
            p.lease.as_ref().is_some_and(|lease| !lease.is_expired(now))
        })
    }

    fn with<T>(&self, portfolio_id: &PortfolioId, f: impl FnOnce(&mut Portfolio) -> T) -> T {
        let mut portfolios = self
            .portfolios
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(portfolios.entry(portfolio_id.clone()).or_default())
    }

    fn with_lease<T>(
        &self,
        token: &LockToken,
        f: impl FnOnce(&mut Portfolio) -> T,
    ) -> Result<T, StorageError> {
        let now = self.clock.now();
        self.with(&token.portfolio_id, |p| {
            let held = p
                .lease
                .as_ref()
                .is_some_and(|lease| lease.id == token.id && !lease.is_expired(now));
            if held {
                Ok(f(p))
            } else {
                Err(StorageError::LockLost {
                    portfolio_id: token.portfolio_id.clone(),
                    token: token.id.clone(),
                })
            }
        })
    }
}

#[async_trait]
impl StoragePort for InMemoryStorage {
    async fn acquire_lock(
        &self,
        portfolio_id: &PortfolioId,
        timeout: Duration,
    ) -> Result<LockToken, StorageError> {
        let started = tokio::time::Instant::now();
        loop {
            let now = self.clock.now();
            let granted = self.with(portfolio_id, |p| {
                if p.lease.as_ref().is_some_and(|lease| !lease.is_expired(now)) {
                    return None;
                }
                let token = LockToken {
                    id: LockId::generate(),
                    portfolio_id: portfolio_id.clone(),
                    acquired_at: now,
                    expires_at: now.plus(self.lease_duration),
                };
                p.lease = Some(token.clone());
                Some(token)
            });
            if let Some(token) = granted {
                return Ok(token);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(StorageError::LockTimeout {
                    portfolio_id: portfolio_id.clone(),
                    waited,
                });
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL.min(timeout - waited)).await;
        }
    }

    async fn release_lock(&self, token: &LockToken) -> Result<(), StorageError> {
        self.with(&token.portfolio_id, |p| {
            if p.lease.as_ref().is_some_and(|lease| lease.id == token.id) {
                p.lease = None;
            }
        });
        Ok(())
    }

    async fn portfolio_exists(&self, portfolio_id: &PortfolioId) -> Result<bool, StorageError> {
        Ok(self.with(portfolio_id, |p| p.state.is_some()))
    }

    async fn read_state(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Option<PersistedState>, StorageError> {
        Ok(self.with(portfolio_id, |p| p.state.clone()))
    }

    async fn write_state_atomic(
        &self,
        token: &LockToken,
        state: &PersistedState,
    ) -> Result<(), StorageError> {
        if take_one(&self.failing_state_writes) {
            return Err(StorageError::io(
                "writing state",
                std::io::Error::other("simulated crash before rename"),
            ));
        }
        self.with_lease(token, |p| p.state = Some(state.clone()))
    }

    async fn append_journal(
        &self,
        token: &LockToken,
        entry: &TradeJournalEntry,
    ) -> Result<(), StorageError> {
        if take_one(&self.failing_appends) {
            return Err(StorageError::io(
                "appending journal",
                std::io::Error::other("simulated disk full"),
            ));
        }
        self.with_lease(token, |p| p.journal.push(entry.clone()))
    }

    async fn read_journal(
        &self,
        portfolio_id: &PortfolioId,
        after_sequence: u64,
    ) -> Result<Vec<TradeJournalEntry>, StorageError> {
        Ok(self.with(portfolio_id, |p| {
            p.journal
                .iter()
                .filter(|e| e.sequence > after_sequence)
                .cloned()
                .collect()
        }))
    }

    async fn write_snapshot(
        &self,
        token: &LockToken,
        snapshot: &Snapshot,
    ) -> Result<(), StorageError> {
        self.with_lease(token, |p| {
            p.snapshots.insert(snapshot.sequence, snapshot.clone());
        })
    }

    async fn read_snapshot(
        &self,
        portfolio_id: &PortfolioId,
        at_or_before: Option<u64>,
    ) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.with(portfolio_id, |p| {
            p.snapshots
                .range(..=at_or_before.unwrap_or(u64::MAX))
                .next_back()
                .map(|(_, snapshot)| snapshot.clone())
        }))
    }
}
