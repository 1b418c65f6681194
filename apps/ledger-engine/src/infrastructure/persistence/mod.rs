//! Storage adapters.
//!
//! - [`FileStorage`]: one directory per portfolio, atomic file replacement
//!   and an fsynced append-only journal.
//! - [`InMemoryStorage`]: same lease semantics without durability, for tests.

mod file_store;
mod in_memory;

pub use file_store::{FileStorage, FileStorageConfig};
pub use in_memory::InMemoryStorage;
