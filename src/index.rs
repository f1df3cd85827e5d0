use crate::batches::BatchRegistry;
use crate::id::{Address, BatchId, MedicineId};
use std::collections::HashMap;

/// Two parallel (manufacturer, medicine) → batch indices, one keyed by address
/// and one keyed by the manufacturer's bound name.
///
/// Entries are only written while a batch is being created, so for a manufacturer
/// whose binding has not changed both keyspaces resolve to the same batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MedicineIndex {
    by_address: HashMap<(Address, MedicineId), BatchId>,
    by_name: HashMap<(String, MedicineId), BatchId>,
}

impl MedicineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_by_address(&mut self, manufacturer: Address, medicine: MedicineId, batch: BatchId) {
        self.by_address.insert((manufacturer, medicine), batch);
    }

    pub fn put_by_name(&mut self, name: String, medicine: MedicineId, batch: BatchId) {
        self.by_name.insert((name, medicine), batch);
    }

    /// Batch that produced `medicine`, or `None` for an unknown medicine
    pub fn batch_of(&self, manufacturer: &Address, medicine: MedicineId) -> Option<BatchId> {
        self.by_address
            .get(&(*manufacturer, medicine))
            .copied()
            .filter(|id| *id != 0)
    }

    pub fn batch_of_by_name(&self, name: &str, medicine: MedicineId) -> Option<BatchId> {
        self.by_name
            .get(&(name.to_string(), medicine))
            .copied()
            .filter(|id| *id != 0)
    }

    /// True when the medicine is unknown or its batch is disabled
    pub fn is_invalid(
        &self,
        batches: &BatchRegistry,
        manufacturer: &Address,
        medicine: MedicineId,
    ) -> bool {
        Self::resolve_invalid(batches, self.batch_of(manufacturer, medicine))
    }

    pub fn is_invalid_by_name(
        &self,
        batches: &BatchRegistry,
        name: &str,
        medicine: MedicineId,
    ) -> bool {
        Self::resolve_invalid(batches, self.batch_of_by_name(name, medicine))
    }

    fn resolve_invalid(batches: &BatchRegistry, batch: Option<BatchId>) -> bool {
        match batch.and_then(|id| batches.get(id)) {
            Some(batch) => batch.is_revoked(),
            None => true,
        }
    }
}
