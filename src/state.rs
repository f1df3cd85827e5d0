use crate::batches::BatchRegistry;
use crate::directory::PharmaDirectory;
use crate::id::{Address, BatchId, MedicineId};
use crate::index::MedicineIndex;
use crate::objects::Batch;
use crate::roles::{RoleManager, RoleSet};
use serde::{Deserialize, Serialize};

/// A single keyed write against one of the persisted tables.
///
/// Writes carry final values rather than deltas, so applying them is idempotent
/// and every backend can store them as plain puts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateWrite {
    Roles {
        principal: Address,
        roles: RoleSet,
    },
    AddressName {
        address: Address,
        name: String,
    },
    PharmaAddresses {
        name: String,
        addresses: Vec<Address>,
    },
    Batch(Batch),
    BatchCounter(BatchId),
    MedicineByAddress {
        manufacturer: Address,
        medicine_id: MedicineId,
        batch_id: BatchId,
    },
    MedicineByName {
        name: String,
        medicine_id: MedicineId,
        batch_id: BatchId,
    },
    BatchMedicines {
        batch_id: BatchId,
        medicines: Vec<MedicineId>,
    },
    PharmaBatches {
        manufacturer: Address,
        batches: Vec<BatchId>,
    },
}

/// The whole registry ledger: every component's committed state.
///
/// Built once when the registry opens and afterwards only replaced by the result
/// of a committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub roles: RoleManager,
    pub directory: PharmaDirectory,
    pub batches: BatchRegistry,
    pub index: MedicineIndex,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger by replaying persisted writes in order
    pub fn replay<'a>(writes: impl IntoIterator<Item = &'a StateWrite>) -> Self {
        let mut state = Self::new();
        for write in writes {
            state.apply(write);
        }
        state
    }

    pub fn apply(&mut self, write: &StateWrite) {
        match write.clone() {
            StateWrite::Roles { principal, roles } => self.roles.put(principal, roles),
            StateWrite::AddressName { address, name } => self.directory.put_name(address, name),
            StateWrite::PharmaAddresses { name, addresses } => {
                self.directory.put_addresses(name, addresses)
            }
            StateWrite::Batch(batch) => self.batches.put_batch(batch),
            StateWrite::BatchCounter(counter) => self.batches.put_counter(counter),
            StateWrite::MedicineByAddress {
                manufacturer,
                medicine_id,
                batch_id,
            } => self.index.put_by_address(manufacturer, medicine_id, batch_id),
            StateWrite::MedicineByName {
                name,
                medicine_id,
                batch_id,
            } => self.index.put_by_name(name, medicine_id, batch_id),
            StateWrite::BatchMedicines {
                batch_id,
                medicines,
            } => self.batches.put_batch_medicines(batch_id, medicines),
            StateWrite::PharmaBatches {
                manufacturer,
                batches,
            } => self.batches.put_pharma_batches(manufacturer, batches),
        }
    }
}
