//! Validation limits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::shared::Money;

/// Bounds applied by the [`Validator`](super::Validator).
///
/// One set of limits applies to every portfolio handled by an engine
/// instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Largest share count per trade.
    pub max_shares: Decimal,
    /// Most fractional digits allowed on a share count.
    pub max_share_decimals: u32,
    /// Highest price per share.
    pub max_price: Money,
    /// Most fractional digits allowed on a price.
    pub max_price_decimals: u32,
    /// Largest `shares × price` per trade.
    pub max_notional: Money,
    /// Most positions open at once; `None` disables the check.
    pub max_open_positions: Option<usize>,
    /// Largest position cost basis as a fraction of book equity; `None`
    /// disables the check.
    pub max_position_fraction: Option<Decimal>,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_shares: dec!(1000000000),
            max_share_decimals: 8,
            max_price: Money::new(dec!(1000000)),
            max_price_decimals: 4,
            max_notional: Money::new(dec!(10000000)),
            max_open_positions: Some(20),
            max_position_fraction: None,
        }
    }
}
