//! Stop Enforcement Bounded Context
//!
//! Decides which positions have breached their stop-loss. Decisions are
//! advisory: a [`TriggeredExit`] is input to the trade executor, which
//! performs the exit through the normal commit path.

pub mod evaluator;
pub mod value_objects;

pub use evaluator::{StopCheck, evaluate_stop};
pub use value_objects::{StaleQuote, StopScan, TriggeredExit, UnavailableQuote};
