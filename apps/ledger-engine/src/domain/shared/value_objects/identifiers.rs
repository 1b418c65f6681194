//! Strongly-typed identifiers.
//!
//! These prevent mixing up ids from different contexts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::DomainError;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a new unique identifier using UUID v4.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(PortfolioId, "Opaque identifier of a portfolio.");
define_id!(LockId, "Identifier of one lock acquisition (the lease owner).");

impl PortfolioId {
    /// Longest id accepted as a storage key.
    pub const MAX_LEN: usize = 64;

    /// Check the id is usable as a storage key: 1-64 ASCII letters, digits,
    /// `-` or `_`.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.0.is_empty() || self.0.len() > Self::MAX_LEN {
            return Err(DomainError::invalid(
                "portfolio_id",
                format!("must be 1-{} characters", Self::MAX_LEN),
            ));
        }
        if !self
            .0
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::invalid(
                "portfolio_id",
                "may only contain letters, digits, '-' and '_'",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_id_new_and_display() {
        let id = PortfolioId::new("main-account");
        assert_eq!(id.as_str(), "main-account");
        assert_eq!(format!("{id}"), "main-account");
    }

    #[test]
    fn lock_id_generate_is_unique() {
        assert_ne!(LockId::generate(), LockId::generate());
    }

    #[test]
    fn portfolio_id_validate() {
        assert!(PortfolioId::new("main_2026-q1").validate().is_ok());
        assert!(PortfolioId::new("").validate().is_err());
        assert!(PortfolioId::new("../etc").validate().is_err());
        assert!(PortfolioId::new("a b").validate().is_err());
        assert!(PortfolioId::new("x".repeat(65)).validate().is_err());
    }

    #[test]
    fn portfolio_id_serde_is_transparent() {
        let id = PortfolioId::from("p1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");
    }
}
