//! Shared Value Objects
//!
//! Immutable domain types used across bounded contexts.
//! Value objects are compared by value, not identity.

mod identifiers;
mod money;
mod quantity;
mod ticker;
mod timestamp;

pub use identifiers::{LockId, PortfolioId};
pub use money::Money;
pub use quantity::Quantity;
pub use ticker::Ticker;
pub use timestamp::Timestamp;
