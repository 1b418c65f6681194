//! Persistence Manager
//!
//! Durably commits ledger transitions through a [`StoragePort`].
//!
//! # Commit protocol
//!
//! 1. Take the portfolio lease (bounded wait, `LockTimeout` otherwise).
//! 2. Re-read the committed sequence; a mismatch with the caller's prior
//!    sequence is a `Conflict`.
//! 3. Append the journal entry, then atomically replace the materialized
//!    state, writing a snapshot first when one is due.
//! 4. Release the lease, whatever happened.
//!
//! The journal is authoritative: a commit has happened once its entry is
//! appended. A failed append commits nothing. A crash or write failure
//! between steps 3a and 3b leaves the state one or more entries behind; every
//! read replays the missing tail, and the next commit persists the healed
//! state.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::ports::{
    LockToken, PersistedState, STATE_FORMAT_VERSION, StorageError, StoragePort,
};
use crate::domain::ledger::{PortfolioState, Snapshot, TradeJournalEntry, apply_entry, replay};
use crate::domain::shared::{Clock, Money, PortfolioId, Ticker};

/// When to write a snapshot after a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Entries since the last snapshot that force a new one (0 disables).
    pub every_entries: u64,
    /// Time since the last snapshot that forces a new one.
    pub interval: Option<Duration>,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            every_entries: 50,
            interval: Some(Duration::from_secs(60 * 60)),
        }
    }
}

/// Persistence manager settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Longest wait for the portfolio lease (default: 10s).
    pub lock_timeout: Duration,
    /// Snapshot cadence.
    pub snapshot: SnapshotPolicy,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(10),
            snapshot: SnapshotPolicy::default(),
        }
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    /// Sequence of the committed entry.
    pub sequence: u64,
    /// Whether a snapshot was written alongside.
    pub snapshot_taken: bool,
    /// Whether the materialized state was rewritten. When false the entry is
    /// still committed and reads replay it from the journal.
    pub state_persisted: bool,
}

/// Trade history filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalQuery {
    /// Only entries for this ticker.
    pub ticker: Option<Ticker>,
    /// At most this many entries.
    pub limit: Option<usize>,
}

/// Result of cross-checking state, journal and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// Portfolio checked.
    pub portfolio_id: PortfolioId,
    /// Sequence of the materialized state.
    pub materialized_sequence: u64,
    /// Sequence of the last journal entry.
    pub journal_sequence: u64,
    /// Sequence of the newest snapshot.
    pub snapshot_sequence: Option<u64>,
    /// Journal entries not yet folded into the materialized state.
    pub pending_entries: u64,
    /// Inconsistencies found.
    pub issues: Vec<String>,
}

impl IntegrityReport {
    /// Whether no inconsistency was found.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Persistence error.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Another writer committed since the caller read the state.
    #[error("Conflict on portfolio {portfolio_id}: expected sequence {expected}, found {found}")]
    Conflict {
        /// Portfolio written.
        portfolio_id: PortfolioId,
        /// Sequence the caller based its change on.
        expected: u64,
        /// Sequence actually committed.
        found: u64,
    },

    /// The portfolio already exists.
    #[error("Portfolio already exists: {portfolio_id}")]
    AlreadyExists {
        /// Existing portfolio.
        portfolio_id: PortfolioId,
    },

    /// A historical sequence past the journal head was requested.
    #[error("Sequence {requested} is beyond the journal head {head} of portfolio {portfolio_id}")]
    SequenceOutOfRange {
        /// Portfolio queried.
        portfolio_id: PortfolioId,
        /// Requested sequence.
        requested: u64,
        /// Last committed sequence.
        head: u64,
    },

    /// The change handed to `commit` does not follow from its inputs.
    #[error("Invalid commit: {reason}")]
    InvalidCommit {
        /// What is inconsistent.
        reason: String,
    },

    /// Stored records do not agree with each other.
    #[error("Integrity failure on portfolio {portfolio_id}: {reason}")]
    Integrity {
        /// Portfolio read.
        portfolio_id: PortfolioId,
        /// What disagreed.
        reason: String,
    },

    /// The storage backend failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Commits and reads portfolio state through a storage backend.
pub struct PersistenceManager<S>
where
    S: StoragePort,
{
    storage: Arc<S>,
    config: PersistenceConfig,
    clock: Arc<dyn Clock>,
}

impl<S> std::fmt::Debug for PersistenceManager<S>
where
    S: StoragePort,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> PersistenceManager<S>
where
    S: StoragePort,
{
    /// Create a manager over `storage`.
    pub fn new(storage: Arc<S>, config: PersistenceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            config,
            clock,
        }
    }

    /// Settings in force.
    #[must_use]
    pub const fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// The storage backend.
    #[must_use]
    pub const fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Create a portfolio holding `starting_cash` and no positions.
    pub async fn create_portfolio(
        &self,
        portfolio_id: &PortfolioId,
        starting_cash: Money,
    ) -> Result<PortfolioState, PersistenceError> {
        portfolio_id
            .validate()
            .map_err(|e| StorageError::InvalidKey {
                reason: e.to_string(),
            })?;
        if starting_cash.is_negative() {
            return Err(PersistenceError::InvalidCommit {
                reason: format!("starting cash {starting_cash} is negative"),
            });
        }

        let token = self.lock(portfolio_id).await?;
        let outcome = self.create_locked(&token, starting_cash).await;
        self.release(&token).await;

        if outcome.is_ok() {
            tracing::info!(
                portfolio_id = %portfolio_id,
                starting_cash = %starting_cash,
                "Portfolio created"
            );
        }
        outcome
    }

    async fn create_locked(
        &self,
        token: &LockToken,
        starting_cash: Money,
    ) -> Result<PortfolioState, PersistenceError> {
        let portfolio_id = &token.portfolio_id;
        if self.storage.portfolio_exists(portfolio_id).await? {
            return Err(PersistenceError::AlreadyExists {
                portfolio_id: portfolio_id.clone(),
            });
        }

        let now = self.clock.now();
        let genesis = PortfolioState::genesis(portfolio_id.clone(), starting_cash, now);
        self.storage
            .write_snapshot(token, &Snapshot::capture(&genesis, now))
            .await?;
        self.storage
            .write_state_atomic(token, &PersistedState::from_state(&genesis, 0, Some(now)))
            .await?;
        Ok(genesis)
    }

    /// Current committed state, including journal entries the materialized
    /// state has not caught up with.
    pub async fn load(&self, portfolio_id: &PortfolioId) -> Result<PortfolioState, PersistenceError> {
        let (_, state) = self.read_current(portfolio_id).await?;
        Ok(state)
    }

    /// Commit one transition.
    ///
    /// `new_state` and `entry` must be the result of applying one transition
    /// to the state at `prior_sequence`.
    pub async fn commit(
        &self,
        portfolio_id: &PortfolioId,
        prior_sequence: u64,
        new_state: &PortfolioState,
        entry: &TradeJournalEntry,
    ) -> Result<CommitResult, PersistenceError> {
        check_commit_shape(portfolio_id, prior_sequence, new_state, entry)?;

        let token = self.lock(portfolio_id).await?;
        let outcome = self
            .commit_locked(&token, prior_sequence, new_state, entry)
            .await;
        self.release(&token).await;

        match &outcome {
            Ok(result) => tracing::info!(
                portfolio_id = %portfolio_id,
                sequence = result.sequence,
                action = %entry.action,
                ticker = entry.ticker.as_ref().map(Ticker::as_str),
                cash_after = %new_state.cash(),
                snapshot_taken = result.snapshot_taken,
                "Committed journal entry"
            ),
            Err(PersistenceError::Conflict { expected, found, .. }) => tracing::debug!(
                portfolio_id = %portfolio_id,
                expected,
                found,
                "Commit conflict"
            ),
            Err(e) => tracing::error!(
                portfolio_id = %portfolio_id,
                sequence = entry.sequence,
                error = %e,
                "Commit failed"
            ),
        }
        outcome
    }

    async fn commit_locked(
        &self,
        token: &LockToken,
        prior_sequence: u64,
        new_state: &PortfolioState,
        entry: &TradeJournalEntry,
    ) -> Result<CommitResult, PersistenceError> {
        let (record, current) = self.read_current(&token.portfolio_id).await?;
        if current.sequence() != prior_sequence {
            return Err(PersistenceError::Conflict {
                portfolio_id: token.portfolio_id.clone(),
                expected: prior_sequence,
                found: current.sequence(),
            });
        }

        let replayed =
            apply_entry(&current, entry).map_err(|e| PersistenceError::InvalidCommit {
                reason: e.to_string(),
            })?;
        if replayed != *new_state {
            return Err(PersistenceError::InvalidCommit {
                reason: format!(
                    "state at sequence {} does not follow from its journal entry",
                    entry.sequence
                ),
            });
        }

        self.storage.append_journal(token, entry).await?;

        let now = self.clock.now();
        let mut persisted =
            PersistedState::from_state(new_state, record.last_snapshot_sequence, record.last_snapshot_at);
        let mut snapshot_taken = false;
        if self.snapshot_due(&record, new_state.sequence()) {
            match self
                .storage
                .write_snapshot(token, &Snapshot::capture(new_state, now))
                .await
            {
                Ok(()) => {
                    persisted.last_snapshot_sequence = new_state.sequence();
                    persisted.last_snapshot_at = Some(now);
                    snapshot_taken = true;
                }
                Err(e) => tracing::warn!(
                    portfolio_id = %token.portfolio_id,
                    sequence = new_state.sequence(),
                    error = %e,
                    "Snapshot failed; state can still be rebuilt from the journal"
                ),
            }
        }

        let state_persisted = match self.storage.write_state_atomic(token, &persisted).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    portfolio_id = %token.portfolio_id,
                    sequence = entry.sequence,
                    error = %e,
                    "State write failed after journal append; reads will replay the entry"
                );
                false
            }
        };
        Ok(CommitResult {
            sequence: entry.sequence,
            snapshot_taken,
            state_persisted,
        })
    }

    fn snapshot_due(&self, record: &PersistedState, sequence: u64) -> bool {
        let policy = self.config.snapshot;
        if policy.every_entries > 0
            && sequence.saturating_sub(record.last_snapshot_sequence) >= policy.every_entries
        {
            return true;
        }
        let now = self.clock.now();
        policy.interval.is_some_and(|interval| {
            record
                .last_snapshot_at
                .is_none_or(|at| now.saturating_since(at) >= interval)
        })
    }

    /// Rebuild state from the newest snapshot and the journal after it.
    pub async fn rebuild(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<PortfolioState, PersistenceError> {
        let snapshot = self.snapshot_for(portfolio_id, None).await?;
        let entries = self
            .storage
            .read_journal(portfolio_id, snapshot.sequence)
            .await?;
        self.replay_onto(portfolio_id, &snapshot, &entries)
    }

    /// State as of journal `sequence`.
    pub async fn state_at(
        &self,
        portfolio_id: &PortfolioId,
        sequence: u64,
    ) -> Result<PortfolioState, PersistenceError> {
        let head = self.load(portfolio_id).await?.sequence();
        if sequence > head {
            return Err(PersistenceError::SequenceOutOfRange {
                portfolio_id: portfolio_id.clone(),
                requested: sequence,
                head,
            });
        }

        let snapshot = self.snapshot_for(portfolio_id, Some(sequence)).await?;
        let entries: Vec<_> = self
            .storage
            .read_journal(portfolio_id, snapshot.sequence)
            .await?
            .into_iter()
            .take_while(|e| e.sequence <= sequence)
            .collect();
        self.replay_onto(portfolio_id, &snapshot, &entries)
    }

    /// Cross-check the materialized state, journal and snapshots.
    pub async fn verify_integrity(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<IntegrityReport, PersistenceError> {
        let record = self.read_record(portfolio_id).await?;
        let journal = self.storage.read_journal(portfolio_id, 0).await?;
        let genesis = self.snapshot_for(portfolio_id, Some(0)).await?;
        let latest = self.storage.read_snapshot(portfolio_id, None).await?;
        let journal_sequence = journal.last().map_or(0, |e| e.sequence);

        let mut issues = Vec::new();
        if record.sequence > journal_sequence {
            issues.push(format!(
                "materialized state at sequence {} is ahead of journal head {journal_sequence}",
                record.sequence
            ));
        }

        match self.replay_onto(portfolio_id, &genesis, &journal) {
            Err(e) => issues.push(format!("journal does not replay from genesis: {e}")),
            Ok(from_genesis) => {
                let at_record = journal.iter().take_while(|e| e.sequence <= record.sequence);
                match (
                    self.replay_onto(portfolio_id, &genesis, at_record),
                    record.to_state(),
                ) {
                    (Ok(expected), Ok(materialized)) if expected != materialized => {
                        issues.push(format!(
                            "materialized state differs from journal replay at sequence {}",
                            record.sequence
                        ));
                    }
                    (_, Err(e)) => issues.push(format!("materialized state invalid: {e}")),
                    _ => {}
                }

                if let Some(snapshot) = &latest {
                    let tail: Vec<_> = journal
                        .iter()
                        .filter(|e| e.sequence > snapshot.sequence)
                        .cloned()
                        .collect();
                    match self.replay_onto(portfolio_id, snapshot, &tail) {
                        Ok(rebuilt) if rebuilt != from_genesis => issues.push(format!(
                            "snapshot {} does not agree with journal replay",
                            snapshot.sequence
                        )),
                        Err(e) => issues.push(format!(
                            "journal does not replay from snapshot {}: {e}",
                            snapshot.sequence
                        )),
                        Ok(_) => {}
                    }
                }
            }
        }

        let report = IntegrityReport {
            portfolio_id: portfolio_id.clone(),
            materialized_sequence: record.sequence,
            journal_sequence,
            snapshot_sequence: latest.map(|s| s.sequence),
            pending_entries: journal_sequence.saturating_sub(record.sequence),
            issues,
        };
        if report.is_consistent() {
            tracing::debug!(portfolio_id = %portfolio_id, journal_sequence, "Integrity check passed");
        } else {
            tracing::warn!(
                portfolio_id = %portfolio_id,
                issues = report.issues.len(),
                "Integrity check found problems"
            );
        }
        Ok(report)
    }

    /// Write a snapshot of the current state now.
    pub async fn snapshot_now(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Snapshot, PersistenceError> {
        let token = self.lock(portfolio_id).await?;
        let outcome = self.snapshot_locked(&token).await;
        self.release(&token).await;
        outcome
    }

    async fn snapshot_locked(&self, token: &LockToken) -> Result<Snapshot, PersistenceError> {
        let (_, current) = self.read_current(&token.portfolio_id).await?;
        let now = self.clock.now();
        let snapshot = Snapshot::capture(&current, now);
        self.storage.write_snapshot(token, &snapshot).await?;
        self.storage
            .write_state_atomic(
                token,
                &PersistedState::from_state(&current, snapshot.sequence, Some(now)),
            )
            .await?;
        tracing::info!(
            portfolio_id = %token.portfolio_id,
            sequence = snapshot.sequence,
            "Snapshot written"
        );
        Ok(snapshot)
    }

    /// Trade history, newest first.
    pub async fn journal(
        &self,
        portfolio_id: &PortfolioId,
        query: &JournalQuery,
    ) -> Result<Vec<TradeJournalEntry>, PersistenceError> {
        self.read_record(portfolio_id).await?;
        let entries = self.storage.read_journal(portfolio_id, 0).await?;
        Ok(entries
            .into_iter()
            .rev()
            .filter(|e| query.ticker.as_ref().is_none_or(|t| e.concerns(t)))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn lock(&self, portfolio_id: &PortfolioId) -> Result<LockToken, PersistenceError> {
        let token = self
            .storage
            .acquire_lock(portfolio_id, self.config.lock_timeout)
            .await?;
        tracing::debug!(portfolio_id = %portfolio_id, token = %token.id, "Lock acquired");
        Ok(token)
    }

    async fn release(&self, token: &LockToken) {
        match self.storage.release_lock(token).await {
            Ok(()) => tracing::debug!(
                portfolio_id = %token.portfolio_id,
                token = %token.id,
                "Lock released"
            ),
            Err(e) => tracing::warn!(
                portfolio_id = %token.portfolio_id,
                token = %token.id,
                error = %e,
                "Lock release failed; lease will expire"
            ),
        }
    }

    async fn read_record(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<PersistedState, PersistenceError> {
        let record = self
            .storage
            .read_state(portfolio_id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                portfolio_id: portfolio_id.clone(),
            })?;
        if record.format_version != STATE_FORMAT_VERSION {
            return Err(StorageError::Corrupt {
                location: format!("state of {portfolio_id}"),
                reason: format!("unsupported format version {}", record.format_version),
            }
            .into());
        }
        if record.portfolio_id != *portfolio_id {
            return Err(StorageError::Corrupt {
                location: format!("state of {portfolio_id}"),
                reason: format!("record belongs to {}", record.portfolio_id),
            }
            .into());
        }
        Ok(record)
    }

    /// The stored record plus the state after replaying any journal tail.
    async fn read_current(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<(PersistedState, PortfolioState), PersistenceError> {
        let record = self.read_record(portfolio_id).await?;
        let materialized = record.to_state().map_err(|e| PersistenceError::Integrity {
            portfolio_id: portfolio_id.clone(),
            reason: e.to_string(),
        })?;

        let tail = self
            .storage
            .read_journal(portfolio_id, record.sequence)
            .await?;
        if tail.is_empty() {
            return Ok((record, materialized));
        }

        tracing::warn!(
            portfolio_id = %portfolio_id,
            materialized_sequence = record.sequence,
            pending_entries = tail.len(),
            "Materialized state behind journal; replaying"
        );
        let current = replay(materialized, &tail).map_err(|e| PersistenceError::Integrity {
            portfolio_id: portfolio_id.clone(),
            reason: e.to_string(),
        })?;
        Ok((record, current))
    }

    async fn snapshot_for(
        &self,
        portfolio_id: &PortfolioId,
        at_or_before: Option<u64>,
    ) -> Result<Snapshot, PersistenceError> {
        self.storage
            .read_snapshot(portfolio_id, at_or_before)
            .await?
            .ok_or_else(|| PersistenceError::Integrity {
                portfolio_id: portfolio_id.clone(),
                reason: "no snapshot found (genesis snapshot missing)".to_string(),
            })
    }

    fn replay_onto<'a, I>(
        &self,
        portfolio_id: &PortfolioId,
        snapshot: &Snapshot,
        entries: I,
    ) -> Result<PortfolioState, PersistenceError>
    where
        I: IntoIterator<Item = &'a TradeJournalEntry>,
    {
        let integrity = |reason: String| PersistenceError::Integrity {
            portfolio_id: portfolio_id.clone(),
            reason,
        };
        let initial = snapshot.to_state().map_err(|e| integrity(e.to_string()))?;
        replay(initial, entries).map_err(|e| integrity(e.to_string()))
    }
}

fn check_commit_shape(
    portfolio_id: &PortfolioId,
    prior_sequence: u64,
    new_state: &PortfolioState,
    entry: &TradeJournalEntry,
) -> Result<(), PersistenceError> {
    let reason = if entry.portfolio_id != *portfolio_id || new_state.portfolio_id() != portfolio_id
    {
        format!("entry or state does not belong to portfolio {portfolio_id}")
    } else if entry.sequence != prior_sequence + 1 {
        format!(
            "entry sequence {} does not follow prior sequence {prior_sequence}",
            entry.sequence
        )
    } else if new_state.sequence() != entry.sequence {
        format!(
            "state sequence {} does not match entry sequence {}",
            new_state.sequence(),
            entry.sequence
        )
    } else {
        return Ok(());
    };
    Err(PersistenceError::InvalidCommit { reason })
}
