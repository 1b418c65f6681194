//! Filesystem storage backend.
//!
//! One directory per portfolio:
//!
//! ```text
//! <root>/<portfolio_id>/
//!   .lock                      lease record (JSON), present while held
//!   state.json                 materialized state
//!   journal.jsonl              one TradeJournalEntry per line
//!   snapshots/<sequence>.json  snapshots, sequence zero-padded to 20 digits
//! ```
//!
//! State and snapshot files are replaced by writing a temporary sibling,
//! syncing it and renaming it over the target, so readers see the old file
//! or the new one and never a partial write. The lock file is published the
//! same way (hard link of a complete temp file), so it is never observed
//! half-written either.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::application::ports::{LockToken, PersistedState, StorageError, StoragePort};
use crate::domain::ledger::{Snapshot, TradeJournalEntry};
use crate::domain::shared::{Clock, LockId, PortfolioId, Timestamp};

const LOCK_FILE: &str = ".lock";
const STATE_FILE: &str = "state.json";
const JOURNAL_FILE: &str = "journal.jsonl";
const SNAPSHOT_DIR: &str = "snapshots";

/// File store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStorageConfig {
    /// Directory holding one sub-directory per portfolio.
    pub root: PathBuf,
    /// How long a lease stays valid without release (default: 30s).
    pub lease_duration: Duration,
    /// Delay between lock attempts (default: 25ms).
    pub poll_interval: Duration,
}

impl FileStorageConfig {
    /// Default settings rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lease_duration: Duration::from_secs(30),
            poll_interval: Duration::from_millis(25),
        }
    }
}

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LeaseRecord {
    token: LockId,
    pid: u32,
    acquired_at: Timestamp,
    expires_at: Timestamp,
}

impl LeaseRecord {
    fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Filesystem implementation of `StoragePort`.
pub struct FileStorage {
    config: FileStorageConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FileStorage {
    /// Create a store. Directories are created on first use.
    #[must_use]
    pub fn new(config: FileStorageConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Directory of one portfolio.
    pub fn portfolio_dir(&self, portfolio_id: &PortfolioId) -> Result<PathBuf, StorageError> {
        portfolio_id
            .validate()
            .map_err(|e| StorageError::InvalidKey {
                reason: e.to_string(),
            })?;
        Ok(self.config.root.join(portfolio_id.as_str()))
    }

    fn snapshot_path(dir: &Path, sequence: u64) -> PathBuf {
        dir.join(SNAPSHOT_DIR).join(format!("{sequence:020}.json"))
    }

    async fn read_lease(lock_path: &Path) -> Result<Option<LeaseRecord>, StorageError> {
        match tokio::fs::read(lock_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| corrupt(lock_path, &e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(format!("reading {}", lock_path.display()), e)),
        }
    }

    /// Publish a complete lock file; `false` if one already exists.
    async fn try_publish_lock(
        dir: &Path,
        lock_path: &Path,
        lease: &LeaseRecord,
    ) -> Result<bool, StorageError> {
        let staged = dir.join(format!("{LOCK_FILE}.{}", lease.token));
        let bytes = serde_json::to_vec(lease).map_err(|e| encode_error(lock_path, &e))?;
        write_synced(&staged, &bytes).await?;

        let published = match tokio::fs::hard_link(&staged, lock_path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::io(format!("creating {}", lock_path.display()), e)),
        };
        let _ = tokio::fs::remove_file(&staged).await;
        published
    }

    /// Move the lock file aside if it still belongs to `owner`.
    ///
    /// Returns whether it was removed. A lock that turns out to belong to
    /// someone else is put back.
    async fn seize_lock(dir: &Path, lock_path: &Path, owner: &LockId) -> Result<bool, StorageError> {
        let aside = dir.join(format!("{LOCK_FILE}.released-{}", LockId::generate()));
        match tokio::fs::rename(lock_path, &aside).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(StorageError::io(format!("moving {}", lock_path.display()), e));
            }
        }

        let seized = Self::read_lease(&aside).await?;
        if seized.as_ref().is_some_and(|lease| lease.token == *owner) {
            let _ = tokio::fs::remove_file(&aside).await;
            return Ok(true);
        }

        // Another writer took the lock in between; hand it back.
        if let Err(e) = tokio::fs::hard_link(&aside, lock_path).await
            && e.kind() != ErrorKind::AlreadyExists
        {
            return Err(StorageError::io(format!("restoring {}", lock_path.display()), e));
        }
        let _ = tokio::fs::remove_file(&aside).await;
        Ok(false)
    }

    async fn check_lease(&self, token: &LockToken) -> Result<PathBuf, StorageError> {
        let dir = self.portfolio_dir(&token.portfolio_id)?;
        let lease = Self::read_lease(&dir.join(LOCK_FILE)).await?;
        let held = lease
            .as_ref()
            .is_some_and(|l| l.token == token.id && !l.is_expired(self.clock.now()));
        if held {
            Ok(dir)
        } else {
            Err(StorageError::LockLost {
                portfolio_id: token.portfolio_id.clone(),
                token: token.id.clone(),
            })
        }
    }
}

#[async_trait]
impl StoragePort for FileStorage {
    async fn acquire_lock(
        &self,
        portfolio_id: &PortfolioId,
        timeout: Duration,
    ) -> Result<LockToken, StorageError> {
        let dir = self.portfolio_dir(portfolio_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(format!("creating {}", dir.display()), e))?;
        let lock_path = dir.join(LOCK_FILE);
        let started = tokio::time::Instant::now();

        loop {
            let now = self.clock.now();
            let lease = LeaseRecord {
                token: LockId::generate(),
                pid: std::process::id(),
                acquired_at: now,
                expires_at: now.plus(self.config.lease_duration),
            };

            if Self::try_publish_lock(&dir, &lock_path, &lease).await? {
                return Ok(LockToken {
                    id: lease.token,
                    portfolio_id: portfolio_id.clone(),
                    acquired_at: lease.acquired_at,
                    expires_at: lease.expires_at,
                });
            }

            if let Some(held) = Self::read_lease(&lock_path).await?
                && held.is_expired(now)
                && Self::seize_lock(&dir, &lock_path, &held.token).await?
            {
                tracing::warn!(
                    portfolio_id = %portfolio_id,
                    stale_token = %held.token,
                    stale_pid = held.pid,
                    expired_at = %held.expires_at,
                    "Broke expired lock lease"
                );
                continue;
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(StorageError::LockTimeout {
                    portfolio_id: portfolio_id.clone(),
                    waited,
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(timeout - waited)).await;
        }
    }

    async fn release_lock(&self, token: &LockToken) -> Result<(), StorageError> {
        let dir = self.portfolio_dir(&token.portfolio_id)?;
        let lock_path = dir.join(LOCK_FILE);
        let ours = Self::read_lease(&lock_path)
            .await?
            .is_some_and(|lease| lease.token == token.id);
        if !ours || !Self::seize_lock(&dir, &lock_path, &token.id).await? {
            tracing::debug!(
                portfolio_id = %token.portfolio_id,
                token = %token.id,
                "Lock no longer ours; nothing to release"
            );
        }
        Ok(())
    }

    async fn portfolio_exists(&self, portfolio_id: &PortfolioId) -> Result<bool, StorageError> {
        let path = self.portfolio_dir(portfolio_id)?.join(STATE_FILE);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::io(format!("checking {}", path.display()), e))
    }

    async fn read_state(
        &self,
        portfolio_id: &PortfolioId,
    ) -> Result<Option<PersistedState>, StorageError> {
        let path = self.portfolio_dir(portfolio_id)?.join(STATE_FILE);
        read_json(&path).await
    }

    async fn write_state_atomic(
        &self,
        token: &LockToken,
        state: &PersistedState,
    ) -> Result<(), StorageError> {
        let dir = self.check_lease(token).await?;
        let path = dir.join(STATE_FILE);
        let bytes = serde_json::to_vec_pretty(state).map_err(|e| encode_error(&path, &e))?;
        replace_atomic(&path, &bytes).await
    }

    async fn append_journal(
        &self,
        token: &LockToken,
        entry: &TradeJournalEntry,
    ) -> Result<(), StorageError> {
        let dir = self.check_lease(token).await?;
        let path = dir.join(JOURNAL_FILE);

        let existing = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StorageError::io(format!("reading {}", path.display()), e)),
        };
        let complete = complete_prefix_len(&existing);
        if complete < existing.len() {
            tracing::warn!(
                portfolio_id = %token.portfolio_id,
                torn_bytes = existing.len() - complete,
                "Truncating torn journal tail"
            );
            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .await
                .map_err(|e| StorageError::io(format!("opening {}", path.display()), e))?;
            file.set_len(complete as u64)
                .await
                .map_err(|e| StorageError::io(format!("truncating {}", path.display()), e))?;
            file.sync_all()
                .await
                .map_err(|e| StorageError::io(format!("syncing {}", path.display()), e))?;
        }

        let mut line = serde_json::to_vec(entry).map_err(|e| encode_error(&path, &e))?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::io(format!("opening {}", path.display()), e))?;
        file.write_all(&line)
            .await
            .map_err(|e| StorageError::io(format!("appending to {}", path.display()), e))?;
        file.sync_all()
            .await
            .map_err(|e| StorageError::io(format!("syncing {}", path.display()), e))
    }

    async fn read_journal(
        &self,
        portfolio_id: &PortfolioId,
        after_sequence: u64,
    ) -> Result<Vec<TradeJournalEntry>, StorageError> {
        let path = self.portfolio_dir(portfolio_id)?.join(JOURNAL_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(format!("reading {}", path.display()), e)),
        };

        let complete = complete_prefix_len(&bytes);
        if complete < bytes.len() {
            tracing::warn!(
                portfolio_id = %portfolio_id,
                torn_bytes = bytes.len() - complete,
                "Ignoring torn journal tail"
            );
        }

        let mut entries = Vec::new();
        for (index, line) in bytes[..complete].split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let entry: TradeJournalEntry =
                serde_json::from_slice(line).map_err(|e| StorageError::Corrupt {
                    location: format!("{} line {}", path.display(), index + 1),
                    reason: e.to_string(),
                })?;
            if entry.sequence > after_sequence {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn write_snapshot(
        &self,
        token: &LockToken,
        snapshot: &Snapshot,
    ) -> Result<(), StorageError> {
        let dir = self.check_lease(token).await?;
        let snapshots = dir.join(SNAPSHOT_DIR);
        tokio::fs::create_dir_all(&snapshots)
            .await
            .map_err(|e| StorageError::io(format!("creating {}", snapshots.display()), e))?;
        let path = Self::snapshot_path(&dir, snapshot.sequence);
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| encode_error(&path, &e))?;
        replace_atomic(&path, &bytes).await
    }

    async fn read_snapshot(
        &self,
        portfolio_id: &PortfolioId,
        at_or_before: Option<u64>,
    ) -> Result<Option<Snapshot>, StorageError> {
        let dir = self.portfolio_dir(portfolio_id)?;
        let snapshots = dir.join(SNAPSHOT_DIR);
        let mut listing = match tokio::fs::read_dir(&snapshots).await {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::io(format!("listing {}", snapshots.display()), e));
            }
        };

        let bound = at_or_before.unwrap_or(u64::MAX);
        let mut best: Option<u64> = None;
        while let Some(item) = listing
            .next_entry()
            .await
            .map_err(|e| StorageError::io(format!("listing {}", snapshots.display()), e))?
        {
            let name = item.file_name();
            let Some(sequence) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok())
            else {
                continue;
            };
            if sequence <= bound && best.is_none_or(|b| sequence > b) {
                best = Some(sequence);
            }
        }

        match best {
            Some(sequence) => read_json(&Self::snapshot_path(&dir, sequence)).await,
            None => Ok(None),
        }
    }
}

/// Length of the newline-terminated part of a journal.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |last| last + 1)
}

fn corrupt(path: &Path, e: &serde_json::Error) -> StorageError {
    StorageError::Corrupt {
        location: path.display().to_string(),
        reason: e.to_string(),
    }
}

fn encode_error(path: &Path, e: &serde_json::Error) -> StorageError {
    StorageError::io(
        format!("encoding {}", path.display()),
        std::io::Error::new(ErrorKind::InvalidData, e.to_string()),
    )
}

async fn read_json<T>(path: &Path) -> Result<Option<T>, StorageError>
where
    T: serde::de::DeserializeOwned,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| corrupt(path, &e)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(format!("reading {}", path.display()), e)),
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| StorageError::io(format!("creating {}", path.display()), e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StorageError::io(format!("writing {}", path.display()), e))?;
    file.sync_all()
        .await
        .map_err(|e| StorageError::io(format!("syncing {}", path.display()), e))
}

/// Replace `path` with `bytes` via a synced temporary sibling and a rename.
async fn replace_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let temp = path.with_file_name(format!(".{file_name}.tmp-{}", LockId::generate()));

    write_synced(&temp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&temp, path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(StorageError::io(format!("replacing {}", path.display()), e));
    }
    Ok(())
}
