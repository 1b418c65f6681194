//! Storage Port (Driven Port)
//!
//! Primitives a durable backend offers the persistence manager. The manager
//! owns the commit protocol; a backend only has to make each primitive
//! atomic on its own.
//!
//! Mutating primitives take the [`LockToken`] returned by
//! [`StoragePort::acquire_lock`] and fail with [`StorageError::LockLost`] when
//! the lease it describes no longer holds.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ledger::{PortfolioState, Position, Snapshot, TradeJournalEntry};
use crate::domain::shared::{DomainError, LockId, Money, PortfolioId, Timestamp};

/// Version written into every persisted state record.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Exclusive right to mutate one portfolio's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockToken {
    /// Lease owner.
    pub id: LockId,
    /// Portfolio the lease covers.
    pub portfolio_id: PortfolioId,
    /// When the lease was granted.
    pub acquired_at: Timestamp,
    /// When other writers may break the lease.
    pub expires_at: Timestamp,
}

impl LockToken {
    /// Whether the lease has run out at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Materialized portfolio state as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Record layout version.
    pub format_version: u32,
    /// Portfolio identity.
    pub portfolio_id: PortfolioId,
    /// Sequence of the last journal entry folded in.
    pub sequence: u64,
    /// Cash balance.
    pub cash: Money,
    /// Open positions ordered by ticker.
    pub positions: Vec<Position>,
    /// Sequence of the newest snapshot.
    pub last_snapshot_sequence: u64,
    /// When the newest snapshot was written.
    pub last_snapshot_at: Option<Timestamp>,
    /// When the portfolio was created.
    pub created_at: Timestamp,
    /// When the state last changed.
    pub updated_at: Timestamp,
}

impl PersistedState {
    /// Record `state`, carrying the snapshot bookkeeping along.
    #[must_use]
    pub fn from_state(
        state: &PortfolioState,
        last_snapshot_sequence: u64,
        last_snapshot_at: Option<Timestamp>,
    ) -> Self {
        Self {
            format_version: STATE_FORMAT_VERSION,
            portfolio_id: state.portfolio_id().clone(),
            sequence: state.sequence(),
            cash: state.cash(),
            positions: state.positions().cloned().collect(),
            last_snapshot_sequence,
            last_snapshot_at,
            created_at: state.created_at(),
            updated_at: state.updated_at(),
        }
    }

    /// The ledger state this record describes.
    pub fn to_state(&self) -> Result<PortfolioState, DomainError> {
        PortfolioState::from_parts(
            self.portfolio_id.clone(),
            self.cash,
            self.positions.clone(),
            self.sequence,
            self.created_at,
            self.updated_at,
        )
    }
}

/// Storage error.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The lock was not acquired in time.
    #[error("Timed out after {waited:?} waiting for the lock on portfolio {portfolio_id}")]
    LockTimeout {
        /// Portfolio being locked.
        portfolio_id: PortfolioId,
        /// How long we waited.
        waited: Duration,
    },

    /// The lease behind a token expired or was taken over.
    #[error("Lock on portfolio {portfolio_id} is no longer held by {token}")]
    LockLost {
        /// Portfolio being written.
        portfolio_id: PortfolioId,
        /// The stale token.
        token: LockId,
    },

    /// No portfolio with this id.
    #[error("Portfolio not found: {portfolio_id}")]
    NotFound {
        /// Missing portfolio.
        portfolio_id: PortfolioId,
    },

    /// Portfolio id unusable as a storage key.
    #[error("Invalid portfolio id: {reason}")]
    InvalidKey {
        /// Why it was refused.
        reason: String,
    },

    /// A stored record cannot be decoded or has an unknown version.
    #[error("Corrupt record {location}: {reason}")]
    Corrupt {
        /// File, key or row at fault.
        location: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The backend failed.
    #[error("I/O error while {context}: {source}")]
    Io {
        /// What we were doing.
        context: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Wrap an I/O error with what we were doing.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::LockLost { .. } => "LOCK_LOST",
            Self::NotFound { .. } => "PORTFOLIO_NOT_FOUND",
            Self::InvalidKey { .. } => "INVALID_PORTFOLIO_ID",
            Self::Corrupt { .. } => "CORRUPT_RECORD",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}

/// Port for durable portfolio storage.
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Take the exclusive lease on a portfolio, waiting up to `timeout`.
    async fn acquire_lock(
        &self,
        portfolio_id: &PortfolioId,
        timeout: Duration,
    ) -> Result<LockToken, StorageError>;

    /// Give the lease back. Releasing a lease that is no longer ours is a no-op.
    async fn release_lock(&self, token: &LockToken) -> Result<(), StorageError>;

    /// Whether a materialized state exists for the portfolio.
    async fn portfolio_exists(&self, portfolio_id: &PortfolioId) -> Result<bool, StorageError>;

    /// Read the materialized state, `None` if the portfolio does not exist.
    async fn read_state(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Option<PersistedState>, StorageError>;

    /// Replace the materialized state in one atomic step.
    async fn write_state_atomic(
        &self,
        token: &LockToken,
        state: &PersistedState,
    ) -> Result<(), StorageError>;

    /// Durably append one entry to the journal.
    async fn append_journal(
        &self,
        token: &LockToken,
        entry: &TradeJournalEntry,
    ) -> Result<(), StorageError>;

    /// Journal entries with a sequence above `after_sequence`, in order.
    async fn read_journal(
        &self,
        portfolio_id: &PortfolioId,
        after_sequence: u64,
    ) -> Result<Vec<TradeJournalEntry>, StorageError>;

    /// Store a snapshot, replacing any earlier one at the same sequence.
    async fn write_snapshot(&self, token: &LockToken, snapshot: &Snapshot)
    -> Result<(), StorageError>;

    /// The newest snapshot at or before `at_or_before` (`None` = newest overall).
    async fn read_snapshot(
        &self,
        portfolio_id: &PortfolioId,
        at_or_before: Option<u64>,
    ) -> Result<Option<Snapshot>, StorageError>;
}
