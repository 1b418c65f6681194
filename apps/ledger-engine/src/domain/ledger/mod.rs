//! Portfolio Ledger Bounded Context
//!
//! The in-memory representation of one portfolio (cash plus open positions)
//! and the pure transitions that move it forward. Every transition takes the
//! current [`PortfolioState`] by reference and returns a new state together
//! with the [`TradeJournalEntry`] that records it; nothing is mutated in
//! place.
//!
//! The journal is the source of truth. [`replay`] rebuilds any state from a
//! [`Snapshot`] plus the entries recorded after it.

pub mod errors;
pub mod journal;
pub mod position;
pub mod replay;
pub mod snapshot;
pub mod state;
pub mod transitions;
pub mod valuation;

pub use errors::LedgerError;
pub use journal::{TradeAction, TradeJournalEntry};
pub use position::Position;
pub use replay::{apply_entry, replay};
pub use snapshot::Snapshot;
pub use state::PortfolioState;
pub use transitions::{
    Transition, apply_buy, apply_deposit, apply_sell, apply_stop_loss_exit, apply_stop_update,
};
pub use valuation::{PortfolioValuation, PositionValuation, valuate};
