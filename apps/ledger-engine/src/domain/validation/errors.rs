//! Validation Errors

use thiserror::Error;

use crate::domain::shared::{Money, Quantity, Ticker};

/// Why a proposed trade was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Ticker does not match the exchange format.
    #[error("Invalid ticker '{raw}': {reason}")]
    InvalidTicker {
        /// Ticker as supplied.
        raw: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Share count out of bounds or too precise.
    #[error("Invalid shares {value}: {reason}")]
    InvalidShares {
        /// Shares as supplied.
        value: Quantity,
        /// What is wrong with it.
        reason: String,
    },

    /// Price missing, out of bounds or too precise.
    #[error("Invalid price: {reason}")]
    InvalidPrice {
        /// Price as supplied.
        value: Option<Money>,
        /// What is wrong with it.
        reason: String,
    },

    /// Sell larger than the holding.
    #[error("Insufficient shares of {ticker}: requested {requested}, held {held}")]
    InsufficientShares {
        /// Ticker being sold.
        ticker: Ticker,
        /// Shares requested.
        requested: Quantity,
        /// Shares held.
        held: Quantity,
    },

    /// Buy larger than available cash.
    #[error("Insufficient cash: required {required}, available {available}")]
    InsufficientCash {
        /// Trade notional.
        required: Money,
        /// Cash on hand.
        available: Money,
    },

    /// Notional above the absolute cap.
    #[error("Trade notional {notional} exceeds limit {limit}")]
    NotionalLimitExceeded {
        /// `shares × price`.
        notional: Money,
        /// Configured cap.
        limit: Money,
    },

    /// Stop-loss not positive, or not below the buy price.
    #[error("Invalid stop loss {stop_loss}: {reason}")]
    InvalidStopLoss {
        /// Stop as supplied.
        stop_loss: Money,
        /// What is wrong with it.
        reason: String,
    },

    /// Opening another position would exceed the position count limit.
    #[error("Position limit reached: {open} open, limit {limit}")]
    PositionLimitReached {
        /// Positions currently open.
        open: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Resulting position too large relative to the portfolio.
    #[error("Position in {ticker} would be {position_value} of {equity} equity, limit {limit_pct}%")]
    PositionSizeExceeded {
        /// Ticker being bought.
        ticker: Ticker,
        /// Cost basis after the buy.
        position_value: Money,
        /// Book equity.
        equity: Money,
        /// Configured limit as a percentage.
        limit_pct: rust_decimal::Decimal,
    },

    /// Cash amount out of bounds.
    #[error("Invalid amount {value}: {reason}")]
    InvalidAmount {
        /// Amount as supplied.
        value: Money,
        /// What is wrong with it.
        reason: String,
    },
}

impl ValidationError {
    /// Stable machine-readable code for the failed rule.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidTicker { .. } => "INVALID_TICKER",
            Self::InvalidShares { .. } => "INVALID_SHARES",
            Self::InvalidPrice { .. } => "INVALID_PRICE",
            Self::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            Self::InsufficientCash { .. } => "INSUFFICIENT_CASH",
            Self::NotionalLimitExceeded { .. } => "NOTIONAL_LIMIT_EXCEEDED",
            Self::InvalidStopLoss { .. } => "INVALID_STOP_LOSS",
            Self::PositionLimitReached { .. } => "POSITION_LIMIT_REACHED",
            Self::PositionSizeExceeded { .. } => "POSITION_SIZE_EXCEEDED",
            Self::InvalidAmount { .. } => "INVALID_AMOUNT",
        }
    }
}
