use crate::error::StorageError;
use crate::id::Address;
use crate::storage::{JournalStore, MemoryStore, RegistryStore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which durable store backs the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Memory,
    Journal { path: PathBuf },
    Sqlite { path: PathBuf },
    RocksDb { path: PathBuf },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory
    }
}

/// Registry startup settings.
///
/// ```json
/// { "admin": "<64 hex chars>", "backend": { "kind": "journal", "path": "registry.journal" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Hex-encoded genesis administrator address
    pub admin: String,

    #[serde(default)]
    pub backend: BackendConfig,
}

impl RegistryConfig {
    pub fn new(admin: Address, backend: BackendConfig) -> Self {
        Self {
            admin: admin.to_hex(),
            backend,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn admin_address(&self) -> Result<Address, StorageError> {
        self.admin.parse().map_err(StorageError::Other)
    }
}

/// Build the store described by `config`
pub fn open_store(config: &BackendConfig) -> Result<Box<dyn RegistryStore>, StorageError> {
    let store: Box<dyn RegistryStore> = match config {
        BackendConfig::Memory => Box::new(MemoryStore::new()),
        BackendConfig::Journal { path } => Box::new(JournalStore::open(path)?),
        #[cfg(feature = "sqlite")]
        BackendConfig::Sqlite { path } => Box::new(crate::storage::SqliteStore::new(path)?),
        #[cfg(feature = "rocksdb")]
        BackendConfig::RocksDb { path } => Box::new(crate::storage::RocksDbStore::new(path)?),
        #[allow(unreachable_patterns)]
        other => {
            return Err(StorageError::Other(format!(
                "Backend {:?} is not enabled in this build",
                other
            )))
        }
    };
    Ok(store)
}
