//! Application Use Cases
//!
//! Use cases orchestrate domain logic to fulfill application requirements.

mod execute_trade;
mod query_portfolio;

pub use execute_trade::{TradeExecutor, TradeExecutorConfig};
pub use query_portfolio::QueryPortfolioUseCase;
