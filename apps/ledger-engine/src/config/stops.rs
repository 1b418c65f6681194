//! Stop-loss monitor configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::services::StopLossMonitorConfig;

/// Stop-loss monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopsConfig {
    /// Oldest price a stop decision may rest on (seconds).
    #[serde(default = "default_max_price_age_secs")]
    pub max_price_age_secs: u64,
}

impl Default for StopsConfig {
    fn default() -> Self {
        Self {
            max_price_age_secs: default_max_price_age_secs(),
        }
    }
}

impl StopsConfig {
    /// Convert to the monitor's runtime settings.
    #[must_use]
    pub const fn to_monitor_config(&self) -> StopLossMonitorConfig {
        StopLossMonitorConfig {
            max_price_age: Duration::from_secs(self.max_price_age_secs),
        }
    }
}

const fn default_max_price_age_secs() -> u64 {
    15 * 60
}
