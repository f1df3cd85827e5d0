use crate::audit::AuditRecord;
use crate::error::StorageError;
use crate::state::StateWrite;
use serde::{Deserialize, Serialize};

/// Everything one committed transaction persists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Keyed writes in the order they were staged
    pub writes: Vec<StateWrite>,

    /// Sealed audit records produced by the transaction
    pub audit: Vec<AuditRecord>,
}

impl Commit {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.audit.is_empty()
    }
}

/// The persisted ledger as loaded from a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedLedger {
    /// Writes that rebuild the ledger when replayed in order
    pub writes: Vec<StateWrite>,

    /// The audit trail ordered by sequence number
    pub audit: Vec<AuditRecord>,
}

impl PersistedLedger {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.audit.is_empty()
    }
}

/// Durable keyed store behind the registry
pub trait RegistryStore: Send + Sync + std::fmt::Debug {
    /// Load the persisted ledger
    ///
    /// # Returns
    /// An empty `PersistedLedger` for a store that has never been committed to
    fn load(&self) -> Result<PersistedLedger, StorageError>;

    /// Persist one transaction atomically
    ///
    /// # Parameters
    /// * `commit` - The writes and audit records of the transaction
    ///
    /// # Returns
    /// Ok(()) once every write and record is durable; on error nothing of the
    /// commit may be visible to a later `load`
    fn commit(&self, commit: &Commit) -> Result<(), StorageError>;

    /// Short backend name for log lines
    fn backend_name(&self) -> &'static str;
}
