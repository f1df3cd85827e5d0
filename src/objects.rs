use crate::id::BatchId;
use serde::{Deserialize, Serialize};
use std::fmt;

// Batch is the record of one manufacturing run. It is never destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub status: BatchStatus,
    /// Unix timestamp (seconds) of creation
    pub created_at: u64,
}

impl Batch {
    pub fn new(id: BatchId, created_at: u64) -> Self {
        Self {
            id,
            status: BatchStatus::Enabled,
            created_at,
        }
    }

    /// Medicines from a disabled batch must not be trusted
    pub fn is_revoked(&self) -> bool {
        self.status == BatchStatus::Disabled
    }
}

/// Lifecycle state of a batch. Any state can move to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Enabled,
    Disabled,
    InRevision,
}

impl BatchStatus {
    pub fn to_int(self) -> i64 {
        match self {
            BatchStatus::Enabled => 0,
            BatchStatus::Disabled => 1,
            BatchStatus::InRevision => 2,
        }
    }

    pub fn from_int(value: i64) -> Result<Self, String> {
        match value {
            0 => Ok(BatchStatus::Enabled),
            1 => Ok(BatchStatus::Disabled),
            2 => Ok(BatchStatus::InRevision),
            _ => Err(format!("Invalid batch status value: {}", value)),
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStatus::Enabled => "enabled",
            BatchStatus::Disabled => "disabled",
            BatchStatus::InRevision => "in-revision",
        };
        f.write_str(name)
    }
}
