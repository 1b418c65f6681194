//! Application Ports (Driver and Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driver Ports** (Primary/Inbound): How the engine's own services are consumed
//! - **Driven Ports** (Secondary/Outbound): How the engine uses external systems

mod price_lookup_port;
mod price_source_port;
mod storage_port;

pub use price_lookup_port::{MarketDataError, PriceLookupPort, PriceObservation, PriceOrigin};
pub use price_source_port::{PriceQuote, PriceSourceError, PriceSourcePort};
pub use storage_port::{LockToken, PersistedState, STATE_FORMAT_VERSION, StorageError, StoragePort};
