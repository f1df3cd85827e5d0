use crate::error::StorageError;
use crate::storage_traits::{Commit, PersistedLedger, RegistryStore};
use std::sync::Mutex;

/// Volatile store; everything is lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStore {
    ledger: Mutex<PersistedLedger>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<PersistedLedger, StorageError> {
        let ledger = self
            .ledger
            .lock()
            .map_err(|e| StorageError::Other(format!("Failed to acquire lock: {}", e)))?;
        Ok(ledger.clone())
    }

    fn commit(&self, commit: &Commit) -> Result<(), StorageError> {
        let mut ledger = self
            .ledger
            .lock()
            .map_err(|e| StorageError::Other(format!("Failed to acquire lock: {}", e)))?;
        ledger.writes.extend(commit.writes.iter().cloned());
        ledger.audit.extend(commit.audit.iter().cloned());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
