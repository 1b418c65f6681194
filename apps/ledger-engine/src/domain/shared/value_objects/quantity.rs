//! Quantity value object for share counts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// A share count.
///
/// Represented as a Decimal so fractional shares are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Quantity {
    /// Create a new Quantity from a Decimal.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a Quantity from an integer.
    #[must_use]
    pub fn from_i64(amount: i64) -> Self {
        Self(Decimal::new(amount, 0))
    }

    /// Zero quantity.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Get the inner Decimal value.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if this quantity is positive.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Returns true if this quantity is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == Decimal::ZERO
    }

    /// Number of significant fractional digits (trailing zeros ignored).
    #[must_use]
    pub fn fractional_digits(&self) -> u32 {
        self.0.normalize().scale()
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl From<Decimal> for Quantity {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quantity_from_i64() {
        assert_eq!(Quantity::from_i64(10).amount(), dec!(10));
    }

    #[test]
    fn quantity_fractional_digits_ignores_trailing_zeros() {
        assert_eq!(Quantity::new(dec!(1.50000)).fractional_digits(), 1);
        assert_eq!(Quantity::new(dec!(0.00000001)).fractional_digits(), 8);
        assert_eq!(Quantity::new(dec!(10)).fractional_digits(), 0);
    }

    #[test]
    fn quantity_arithmetic() {
        let a = Quantity::new(dec!(10.5));
        let b = Quantity::new(dec!(0.5));
        assert_eq!((a + b).amount(), dec!(11.0));
        assert!((b - b).is_zero());
    }

    #[test]
    fn quantity_display_normalizes() {
        assert_eq!(format!("{}", Quantity::new(dec!(15.000))), "15");
    }

    #[test]
    fn quantity_serializes_as_string() {
        let q = Quantity::new(dec!(2.25));
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"2.25\"");
    }
}
