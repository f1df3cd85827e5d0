// Re-export the storage trait
pub use crate::storage_traits::{Commit, PersistedLedger, RegistryStore};

// Export implementations
mod journal;
mod memory;
pub use journal::JournalStore;
pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "rocksdb")]
mod rocksdb;
#[cfg(feature = "rocksdb")]
pub use rocksdb::RocksDbStore;
