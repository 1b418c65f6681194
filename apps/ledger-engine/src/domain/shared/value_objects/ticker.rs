//! Ticker value object for listed equity symbols.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::domain::shared::DomainError;

/// A plain symbol, optionally followed by an exchange suffix.
const TICKER_PATTERN: &str = r"^[A-Z]{1,5}(\.[A-Z]{1,4})?$";

fn ticker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    RE.get_or_init(|| Regex::new(TICKER_PATTERN).expect("ticker pattern is valid"))
}

/// A validated trading symbol.
///
/// Examples:
/// - Plain: "AAPL", "MSFT", "F"
/// - With exchange suffix: "SHOP.TO", "VOD.L"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    /// Parse a raw symbol.
    ///
    /// Surrounding whitespace is trimmed and the symbol is upper-cased before
    /// it is matched against the exchange format.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.is_empty() {
            return Err(DomainError::invalid("ticker", "Ticker cannot be empty"));
        }
        if !ticker_regex().is_match(&normalized) {
            return Err(DomainError::invalid(
                "ticker",
                format!("'{normalized}' is not a valid symbol (1-5 letters, optional .XXXX suffix)"),
            ));
        }
        Ok(Self(normalized))
    }

    /// Get the symbol string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The exchange suffix, if any (e.g. "TO" for "SHOP.TO").
    #[must_use]
    pub fn exchange_suffix(&self) -> Option<&str> {
        self.0.split_once('.').map(|(_, suffix)| suffix)
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Ticker {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("AAPL" ; "plain")]
    #[test_case("F" ; "single letter")]
    #[test_case("GOOGL" ; "five letters")]
    #[test_case("SHOP.TO" ; "exchange suffix")]
    #[test_case("BRK.B" ; "class suffix")]
    #[test_case("ABCDE.ABCD" ; "max lengths")]
    fn ticker_accepts(raw: &str) {
        assert_eq!(Ticker::parse(raw).unwrap().as_str(), raw);
    }

    #[test_case("" ; "empty")]
    #[test_case("ABCDEF" ; "six letters")]
    #[test_case("AAPL." ; "dangling dot")]
    #[test_case("AAPL.ABCDE" ; "suffix too long")]
    #[test_case("AA PL" ; "inner space")]
    #[test_case("BRK-B" ; "dash")]
    #[test_case("123" ; "digits")]
    fn ticker_rejects(raw: &str) {
        assert!(Ticker::parse(raw).is_err());
    }

    #[test]
    fn ticker_normalizes_case_and_whitespace() {
        let t = Ticker::parse("  aapl ").unwrap();
        assert_eq!(t.as_str(), "AAPL");
    }

    #[test]
    fn ticker_exchange_suffix() {
        assert_eq!(Ticker::parse("SHOP.TO").unwrap().exchange_suffix(), Some("TO"));
        assert_eq!(Ticker::parse("AAPL").unwrap().exchange_suffix(), None);
    }

    #[test]
    fn ticker_serde_roundtrip_validates() {
        let t = Ticker::parse("MSFT").unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "\"MSFT\"");
        assert_eq!(serde_json::from_str::<Ticker>(&json).unwrap(), t);
        assert!(serde_json::from_str::<Ticker>("\"not a ticker\"").is_err());
    }
}
