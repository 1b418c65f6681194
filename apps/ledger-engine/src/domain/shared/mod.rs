//! Shared Domain Types
//!
//! Value objects, the clock abstraction and errors shared across the ledger,
//! validation and stop enforcement contexts.

pub mod clock;
pub mod errors;
pub mod value_objects;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::DomainError;
pub use value_objects::{LockId, Money, PortfolioId, Quantity, Ticker, Timestamp};
