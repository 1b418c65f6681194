//! Engine-level error type.
//!
//! Every failure a caller of the engine can see is one [`EngineError`]
//! variant. Callers need two answers from it:
//!
//! | Question | Method | Variants |
//! |----------|--------|----------|
//! | Was the request refused on its merits? | [`EngineError::is_rejection`] | validation, insufficient funds or shares, unknown portfolio |
//! | Could the outcome not be confirmed? | [`EngineError::is_unconfirmed`] | market data, lock, conflict, storage, integrity |
//!
//! A rejection means nothing changed. An unconfirmed outcome means the caller
//! must re-read the portfolio before retrying.

use std::time::Duration;

use thiserror::Error;

use crate::application::ports::{MarketDataError, StorageError};
use crate::application::services::PersistenceError;
use crate::domain::ledger::LedgerError;
use crate::domain::shared::{Money, PortfolioId, Quantity, Ticker};
use crate::domain::validation::ValidationError;

/// Error returned by the engine's use cases.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request malformed or against a trading rule.
    #[error(transparent)]
    Validation(ValidationError),

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

    /// Buy larger than the cash on hand.
    #[error("Insufficient cash: required {required}, available {available}")]
    InsufficientCash {
        /// Cash the trade needs.
        required: Money,
        /// Cash on hand.
        available: Money,
    },

    /// Operation needs a position that is not held.
    #[error("No open position in {ticker}")]
    NoPosition {
        /// Ticker without a position.
        ticker: Ticker,
    },

    /// A stop exit was requested but the position's stop is not breached at
    /// the exit price.
    #[error("Stop-loss on {ticker} is not breached at {price}")]
    StopNotBreached {
        /// Ticker to exit.
        ticker: Ticker,
        /// Exit price offered.
        price: Money,
        /// Stop currently in force.
        stop_loss: Option<Money>,
    },

    /// No usable price.
    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    /// The portfolio lock was not obtained in time.
    #[error("Timed out after {waited:?} waiting for the lock on portfolio {portfolio_id}")]
    LockTimeout {
        /// Portfolio being locked.
        portfolio_id: PortfolioId,
        /// How long the last attempt waited.
        waited: Duration,
    },

    /// Other writers kept committing first.
    #[error("Portfolio {portfolio_id} kept changing; gave up after {attempts} attempts")]
    Conflict {
        /// Portfolio being written.
        portfolio_id: PortfolioId,
        /// Attempts made.
        attempts: u32,
    },

    /// No portfolio with this id.
    #[error("Portfolio not found: {portfolio_id}")]
    PortfolioNotFound {
        /// Missing portfolio.
        portfolio_id: PortfolioId,
    },

    /// A portfolio with this id already exists.
    #[error("Portfolio already exists: {portfolio_id}")]
    PortfolioExists {
        /// Existing portfolio.
        portfolio_id: PortfolioId,
    },

    /// Historical sequence past the journal head.
    #[error("Sequence {requested} is beyond the journal head {head} of portfolio {portfolio_id}")]
    SequenceOutOfRange {
        /// Portfolio queried.
        portfolio_id: PortfolioId,
        /// Requested sequence.
        requested: u64,
        /// Last committed sequence.
        head: u64,
    },

    /// The storage backend failed.
    #[error(transparent)]
    Storage(StorageError),

    /// Stored records disagree with each other.
    #[error("Integrity failure on portfolio {portfolio_id}: {reason}")]
    Integrity {
        /// Portfolio read.
        portfolio_id: PortfolioId,
        /// What disagreed.
        reason: String,
    },

    /// A bug: an invariant the engine itself maintains was broken.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(e) => e.code(),
            Self::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            Self::InsufficientCash { .. } => "INSUFFICIENT_CASH",
            Self::NoPosition { .. } => "NO_POSITION",
            Self::StopNotBreached { .. } => "STOP_NOT_BREACHED",
            Self::MarketData(e) => e.code(),
            Self::LockTimeout { .. } => "LOCK_TIMEOUT",
            Self::Conflict { .. } => "CONFLICT",
            Self::PortfolioNotFound { .. } => "PORTFOLIO_NOT_FOUND",
            Self::PortfolioExists { .. } => "PORTFOLIO_EXISTS",
            Self::SequenceOutOfRange { .. } => "SEQUENCE_OUT_OF_RANGE",
            Self::Storage(e) => e.code(),
            Self::Integrity { .. } => "INTEGRITY_FAILURE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the request was refused on its merits. Nothing changed and
    /// retrying the same request will fail the same way.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InsufficientShares { .. }
                | Self::InsufficientCash { .. }
                | Self::NoPosition { .. }
                | Self::StopNotBreached { .. }
                | Self::PortfolioNotFound { .. }
                | Self::PortfolioExists { .. }
                | Self::SequenceOutOfRange { .. }
                | Self::Storage(StorageError::InvalidKey { .. })
        )
    }

    /// Whether the engine could not confirm the outcome. The caller should
    /// re-read the portfolio before trying again.
    #[must_use]
    pub const fn is_unconfirmed(&self) -> bool {
        !self.is_rejection()
    }

    /// Whether the failure is contention that may clear on its own.
    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::Conflict { .. })
    }
}

impl From<ValidationError> for EngineError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::InsufficientShares {
                ticker,
                requested,
                held,
            } => Self::InsufficientShares {
                ticker,
                requested,
                held,
            },
            ValidationError::InsufficientCash {
                required,
                available,
            } => Self::InsufficientCash {
                required,
                available,
            },
            other => Self::Validation(other),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientShares {
                ticker,
                requested,
                held,
            } => Self::InsufficientShares {
                ticker,
                requested,
                held,
            },
            LedgerError::InsufficientCash {
                required,
                available,
            } => Self::InsufficientCash {
                required,
                available,
            },
            LedgerError::NoPosition { ticker } => Self::NoPosition { ticker },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { portfolio_id } => Self::PortfolioNotFound { portfolio_id },
            StorageError::LockTimeout {
                portfolio_id,
                waited,
            } => Self::LockTimeout {
                portfolio_id,
                waited,
            },
            other => Self::Storage(other),
        }
    }
}

impl From<PersistenceError> for EngineError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Conflict { portfolio_id, .. } => Self::Conflict {
                portfolio_id,
                attempts: 1,
            },
            PersistenceError::AlreadyExists { portfolio_id } => {
                Self::PortfolioExists { portfolio_id }
            }
            PersistenceError::SequenceOutOfRange {
                portfolio_id,
                requested,
                head,
            } => Self::SequenceOutOfRange {
                portfolio_id,
                requested,
                head,
            },
            PersistenceError::InvalidCommit { reason } => Self::Internal(reason),
            PersistenceError::Integrity {
                portfolio_id,
                reason,
            } => Self::Integrity {
                portfolio_id,
                reason,
            },
            PersistenceError::Storage(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn aapl() -> Ticker {
        Ticker::parse("AAPL").unwrap()
    }

    #[test]
    fn insufficient_shares_gets_its_own_kind() {
        let err: EngineError = ValidationError::InsufficientShares {
            ticker: aapl(),
            requested: Quantity::from_i64(15),
            held: Quantity::from_i64(10),
        }
        .into();
        assert!(matches!(err, EngineError::InsufficientShares { .. }));
        assert_eq!(err.code(), "INSUFFICIENT_SHARES");
        assert!(err.is_rejection());
    }

    #[test]
    fn validation_codes_pass_through() {
        let err: EngineError = ValidationError::NotionalLimitExceeded {
            notional: Money::new(dec!(20000000)),
            limit: Money::new(dec!(10000000)),
        }
        .into();
        assert_eq!(err.code(), "NOTIONAL_LIMIT_EXCEEDED");
        assert!(!err.is_unconfirmed());
    }

    #[test]
    fn faults_are_unconfirmed() {
        let io: EngineError = PersistenceError::Storage(StorageError::io(
            "writing state",
            std::io::Error::other("disk full"),
        ))
        .into();
        assert_eq!(io.code(), "IO_ERROR");
        assert!(io.is_unconfirmed());

        let timeout: EngineError = StorageError::LockTimeout {
            portfolio_id: PortfolioId::new("p1"),
            waited: Duration::from_secs(10),
        }
        .into();
        assert!(timeout.is_unconfirmed());
        assert!(timeout.is_contention());

        let market: EngineError = MarketDataError::NotFound { ticker: aapl() }.into();
        assert_eq!(market.code(), "TICKER_NOT_FOUND");
        assert!(market.is_unconfirmed());
    }

    #[test]
    fn missing_portfolio_is_a_rejection() {
        let err: EngineError = PersistenceError::Storage(StorageError::NotFound {
            portfolio_id: PortfolioId::new("ghost"),
        })
        .into();
        assert!(matches!(err, EngineError::PortfolioNotFound { .. }));
        assert!(err.is_rejection());
    }
}
