// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Ledger Engine - Rust Core Library
//!
//! Portfolio ledger and trade execution engine: cash and positions for one
//! or more portfolios, changed only through validated trades that are
//! journaled and committed durably.
//!
//! # Architecture (Clean Architecture + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `shared`: `Money`, `Quantity`, `Ticker`, `PortfolioId`, `Timestamp`, `Clock`
//!   - `ledger`: Portfolio state, transitions, journal, replay, snapshots, valuation
//!   - `validation`: Trade validation rules and limits
//!   - `stop_enforcement`: Per-position stop-loss evaluation
//!
//! - **Resilience**: Circuit breaker and retry/backoff policy
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: `PriceSourcePort`, `PriceLookupPort`, `StoragePort`
//!   - `services`: `MarketDataGateway`, `PersistenceManager`, `StopLossMonitor`
//!   - `use_cases`: `TradeExecutor`, `QueryPortfolioUseCase`
//!   - `dto`: `TradeRequest`, `TradeResult`, `PortfolioSummary`
//!
//! - **Infrastructure**: Adapters
//!   - `persistence`: `FileStorage`, `InMemoryStorage`
//!   - `price_feed`: `MockPriceSource`
//!   - `container`: Wiring from [`config::Config`]
//!
//! # Commit protocol
//!
//! A change is planned against a loaded state, then committed under the
//! portfolio lock only if no other writer committed in between. The journal
//! entry is made durable before the materialized state is replaced, so a
//! crash between the two is repaired by replay on the next load.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no I/O.
pub mod domain;

/// Resilience patterns for the market data source.
pub mod resilience;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and wiring.
pub mod infrastructure;

// =============================================================================
// Ambient stack
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Engine-level error type.
pub mod error;

/// Logging setup.
pub mod observability;

// =============================================================================
// Re-exports
// =============================================================================

pub use application::dto::{PortfolioSummary, TradeRequest, TradeResult};
pub use application::services::{MarketDataGateway, PersistenceManager, StopLossMonitor};
pub use application::use_cases::{QueryPortfolioUseCase, TradeExecutor};
pub use domain::ledger::{PortfolioState, Position, TradeAction, TradeJournalEntry};
pub use domain::shared::{Money, PortfolioId, Quantity, Ticker, Timestamp};
pub use domain::validation::OrderSide;
pub use error::EngineError;
pub use infrastructure::Container;
