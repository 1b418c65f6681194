//! Ledger Errors

use thiserror::Error;

use super::TradeAction;
use crate::domain::shared::{Money, Quantity, Ticker};

/// Errors raised by ledger transitions and journal replay.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A sell asked for more shares than are held.
    #[error("Insufficient shares of {ticker}: requested {requested}, held {held}")]
    InsufficientShares {
        /// Ticker being sold.
        ticker: Ticker,
        /// Shares requested.
        requested: Quantity,
        /// Shares currently held.
        held: Quantity,
    },

    /// A buy would drive cash below zero.
    #[error("Insufficient cash: required {required}, available {available}")]
    InsufficientCash {
        /// Cash the trade needs.
        required: Money,
        /// Cash on hand.
        available: Money,
    },

    /// The operation needs a position that does not exist.
    #[error("No open position in {ticker}")]
    NoPosition {
        /// Ticker without a position.
        ticker: Ticker,
    },

    /// A share count, price or amount was zero or negative.
    #[error("{field} must be positive, got {value}")]
    NonPositive {
        /// Which input.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Journal entries are not contiguous.
    #[error("Journal sequence gap: expected {expected}, found {found}")]
    SequenceGap {
        /// Next sequence the state expects.
        expected: u64,
        /// Sequence carried by the entry.
        found: u64,
    },

    /// A journal entry disagrees with the transition it claims to record.
    #[error("Journal entry {sequence} ({action}) does not replay: {reason}")]
    ReplayMismatch {
        /// Offending entry.
        sequence: u64,
        /// Its action.
        action: TradeAction,
        /// What disagreed.
        reason: String,
    },
}
