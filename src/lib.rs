pub mod audit;
pub mod batches;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod id;
pub mod index;
pub mod objects;
pub mod registry;
pub mod roles;
pub mod state;
pub mod storage;
pub mod storage_traits;
pub mod transaction;

// Re-export the main types for convenience
pub use audit::{AuditEvent, AuditLog, AuditRecord};
pub use batches::BatchRegistry;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{open_store, BackendConfig, RegistryConfig};
pub use directory::PharmaDirectory;
pub use error::{RegistryError, RegistryResult, StorageError};
pub use id::{Address, BatchId, MedicineId};
pub use index::MedicineIndex;
pub use objects::{Batch, BatchStatus};
pub use registry::Registry;
pub use roles::{Authorizer, Role, RoleManager, RoleSet};
pub use state::{LedgerState, StateWrite};
pub use storage_traits::{Commit, PersistedLedger, RegistryStore};
pub use storage::{JournalStore, MemoryStore};
pub use transaction::Transaction;

// Re-export the storage implementations
#[cfg(feature = "rocksdb")]
pub use storage::RocksDbStore;

#[cfg(feature = "sqlite")]
pub use storage::SqliteStore;
