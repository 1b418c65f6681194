//! Price Source Adapters
//!
//! Implementations of `PriceSourcePort`. Live vendor adapters sit outside
//! this crate; the scripted source drives tests and local runs.

pub mod mock;

pub use mock::MockPriceSource;
