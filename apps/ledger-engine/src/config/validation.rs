//! Trade validation limits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Money;
use crate::domain::validation::ValidationLimits;

/// Limits applied to every trade handled by this engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Largest share count per trade.
    #[serde(default = "default_max_shares")]
    pub max_shares: Decimal,
    /// Most fractional digits on a share count.
    #[serde(default = "default_max_share_decimals")]
    pub max_share_decimals: u32,
    /// Highest price per share.
    #[serde(default = "default_max_price")]
    pub max_price: Decimal,
    /// Most fractional digits on a price.
    #[serde(default = "default_max_price_decimals")]
    pub max_price_decimals: u32,
    /// Largest trade notional.
    #[serde(default = "default_max_notional")]
    pub max_notional: Decimal,
    /// Most positions open at once (unset disables the check).
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: Option<usize>,
    /// Largest position as a fraction of book equity (unset disables the check).
    #[serde(default)]
    pub max_position_fraction: Option<Decimal>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_shares: default_max_shares(),
            max_share_decimals: default_max_share_decimals(),
            max_price: default_max_price(),
            max_price_decimals: default_max_price_decimals(),
            max_notional: default_max_notional(),
            max_open_positions: default_max_open_positions(),
            max_position_fraction: None,
        }
    }
}

impl ValidationConfig {
    /// Convert to the validator's limits.
    #[must_use]
    pub fn to_limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_shares: self.max_shares,
            max_share_decimals: self.max_share_decimals,
            max_price: Money::new(self.max_price),
            max_price_decimals: self.max_price_decimals,
            max_notional: Money::new(self.max_notional),
            max_open_positions: self.max_open_positions,
            max_position_fraction: self.max_position_fraction,
        }
    }
}

fn default_max_shares() -> Decimal {
    ValidationLimits::default().max_shares
}

const fn default_max_share_decimals() -> u32 {
    8
}

fn default_max_price() -> Decimal {
    ValidationLimits::default().max_price.amount()
}

const fn default_max_price_decimals() -> u32 {
    4
}

fn default_max_notional() -> Decimal {
    ValidationLimits::default().max_notional.amount()
}

const fn default_max_open_positions() -> Option<usize> {
    Some(20)
}
