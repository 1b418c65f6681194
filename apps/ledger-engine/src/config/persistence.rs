//! Persistence configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::{PersistenceConfig as ManagerConfig, SnapshotPolicy};
use crate::infrastructure::persistence::FileStorageConfig;

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding one sub-directory per portfolio.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Longest wait for a portfolio lock (milliseconds).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// How long a lock lease survives a crashed holder (seconds).
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Delay between lock attempts (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Snapshot cadence.
    #[serde(default)]
    pub snapshot: SnapshotSettings,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            lock_timeout_ms: default_lock_timeout_ms(),
            lease_secs: default_lease_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            snapshot: SnapshotSettings::default(),
        }
    }
}

impl PersistenceConfig {
    /// Convert to the persistence manager's settings.
    #[must_use]
    pub const fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            snapshot: self.snapshot.to_policy(),
        }
    }

    /// Convert to the file store's settings.
    #[must_use]
    pub fn to_file_storage_config(&self) -> FileStorageConfig {
        FileStorageConfig {
            root: PathBuf::from(&self.data_dir),
            lease_duration: self.lease_duration(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// Lock lease length.
    #[must_use]
    pub const fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }
}

/// Snapshot cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSettings {
    /// Journal entries between snapshots (0 disables).
    #[serde(default = "default_every_entries")]
    pub every_entries: u64,
    /// Time between snapshots (seconds, unset disables).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: Option<u64>,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            every_entries: default_every_entries(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl SnapshotSettings {
    /// Convert to the manager's snapshot policy.
    #[must_use]
    pub const fn to_policy(&self) -> SnapshotPolicy {
        SnapshotPolicy {
            every_entries: self.every_entries,
            interval: match self.interval_secs {
                Some(secs) => Some(Duration::from_secs(secs)),
                None => None,
            },
        }
    }
}

fn default_data_dir() -> String {
    "data/portfolios".to_string()
}

const fn default_lock_timeout_ms() -> u64 {
    10_000
}

const fn default_lease_secs() -> u64 {
    30
}

const fn default_poll_interval_ms() -> u64 {
    25
}

const fn default_every_entries() -> u64 {
    50
}

const fn default_interval_secs() -> Option<u64> {
    Some(60 * 60)
}
