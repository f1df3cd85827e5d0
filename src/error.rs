use std::io;
use thiserror::Error;

/// Errors raised by the durable store behind the registry
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO errors that occur when reading/writing files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors reported by the underlying storage backend
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors related to missing or invalid data
    #[error("Not found: {0}")]
    NotFound(String),

    /// Errors that occur while appending to or replaying the journal
    #[error("Journal error: {0}")]
    Journal(String),

    /// The audit hash chain does not link up at the given sequence number
    #[error("Audit chain broken at sequence {0}")]
    AuditChainInvalid(u64),

    /// Generic errors that don't fit in other categories
    #[error("Other error: {0}")]
    Other(String),

    /// Anyhow error wrapper for error context
    #[error(transparent)]
    Context(#[from] anyhow::Error),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(feature = "rocksdb")]
impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("Row not found".to_string()),
            _ => StorageError::Database(err.to_string()),
        }
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        StorageError::Other(err)
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        StorageError::Other(err.to_string())
    }
}

/// Failures reported by registry operations.
///
/// Every variant aborts the enclosing transaction; the committed state is left
/// exactly as it was before the call.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Caller lacks the required role or does not match the manufacturer
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// The referenced batch id was never allocated
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    /// The manufacturer has no bound display name
    #[error("Manufacturer {0} has no bound name")]
    NameNotSet(String),

    /// A zero medicine id was submitted
    #[error("Invalid medicine id at position {0}")]
    InvalidMedicineId(usize),

    /// Empty name or null address
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The durable store rejected the commit
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RegistryError {
    /// Short stable label used in log lines
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryError::NotAuthorized(_) => "NotAuthorized",
            RegistryError::BatchNotFound(_) => "BatchNotFound",
            RegistryError::NameNotSet(_) => "NameNotSet",
            RegistryError::InvalidMedicineId(_) => "InvalidMedicineId",
            RegistryError::InvalidInput(_) => "InvalidInput",
            RegistryError::Storage(_) => "Storage",
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
