//! Application Services
//!
//! Long-lived components the use cases are composed from.

mod market_data_gateway;
mod persistence_manager;
mod stop_loss_monitor;

pub use market_data_gateway::{MarketDataGateway, MarketDataGatewayConfig};
pub use persistence_manager::{
    CommitResult, IntegrityReport, JournalQuery, PersistenceConfig, PersistenceError,
    PersistenceManager, SnapshotPolicy,
};
pub use stop_loss_monitor::{StopLossMonitor, StopLossMonitorConfig};
