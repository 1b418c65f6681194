//! Trade Validation Bounded Context
//!
//! Pure, deterministic checks that a proposed trade is well-formed and
//! affordable against a given portfolio state. Rules run in a fixed order
//! and the first failure is reported, so the same input always yields the
//! same error.

pub mod errors;
pub mod limits;
pub mod proposal;
pub mod validator;

pub use errors::ValidationError;
pub use limits::ValidationLimits;
pub use proposal::{OrderSide, TradeProposal, ValidatedTrade};
pub use validator::Validator;
