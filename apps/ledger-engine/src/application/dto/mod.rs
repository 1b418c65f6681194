//! Data Transfer Objects (DTOs)
//!
//! DTOs are used for the library boundary and use case inputs/outputs.

mod portfolio_dto;
mod trade_dto;

pub use portfolio_dto::PortfolioSummary;
pub use trade_dto::{TradeRequest, TradeResult};
