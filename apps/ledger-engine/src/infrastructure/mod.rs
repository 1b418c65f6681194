//! Infrastructure Layer
//!
//! Adapters implementing the ports defined in the application layer:
//!
//! - `persistence/`: Storage backends (filesystem, in-memory)
//! - `price_feed/`: Price sources (scriptable mock)
//! - `container`: Wiring from configuration

pub mod container;
pub mod persistence;
pub mod price_feed;

pub use container::Container;
pub use persistence::{FileStorage, FileStorageConfig, InMemoryStorage};
pub use price_feed::MockPriceSource;
