//! Domain Layer
//!
//! The innermost layer containing business logic with zero infrastructure dependencies.
//! This layer defines:
//!
//! - **Value Objects**: Immutable domain types with equality by value
//! - **Pure transitions**: Portfolio state changes that return new values
//! - **Domain Services**: Stateless business rules
//!
//! # Bounded Contexts
//!
//! - [`ledger`]: Portfolio state, journal entries, transitions and replay
//! - [`validation`]: Trade proposal rules and limits
//! - [`stop_enforcement`]: Stop-loss breach detection

pub mod ledger;
pub mod shared;
pub mod stop_enforcement;
pub mod validation;
