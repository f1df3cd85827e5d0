use crate::id::{Address, BatchId, MedicineId};
use crate::objects::{Batch, BatchStatus};
use std::collections::{BTreeMap, HashMap};

/// Batch records, the id counter and the per-manufacturer/per-batch lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchRegistry {
    batches: BTreeMap<BatchId, Batch>,
    /// Last allocated batch id; zero before the first batch
    counter: BatchId,
    pharma_batches: HashMap<Address, Vec<BatchId>>,
    batch_medicines: HashMap<BatchId, Vec<MedicineId>>,
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequential batch id. Ids start at 1 and are never reused.
    pub fn allocate_id(&mut self) -> BatchId {
        self.counter += 1;
        self.counter
    }

    pub fn counter(&self) -> BatchId {
        self.counter
    }

    pub fn put_counter(&mut self, counter: BatchId) {
        self.counter = counter;
    }

    pub fn put_batch(&mut self, batch: Batch) {
        self.batches.insert(batch.id, batch);
    }

    /// Overwrite a batch status, returning the updated record
    pub fn set_status(&mut self, id: BatchId, status: BatchStatus) -> Option<&Batch> {
        let batch = self.batches.get_mut(&id)?;
        batch.status = status;
        Some(batch)
    }

    pub fn get(&self, id: BatchId) -> Option<&Batch> {
        // Id 0 is the "not found" sentinel and is never stored
        if id == 0 {
            return None;
        }
        self.batches.get(&id)
    }

    pub fn append_pharma_batch(&mut self, manufacturer: Address, id: BatchId) -> &[BatchId] {
        let list = self.pharma_batches.entry(manufacturer).or_default();
        list.push(id);
        list
    }

    pub fn put_pharma_batches(&mut self, manufacturer: Address, ids: Vec<BatchId>) {
        self.pharma_batches.insert(manufacturer, ids);
    }

    pub fn put_batch_medicines(&mut self, id: BatchId, medicines: Vec<MedicineId>) {
        self.batch_medicines.insert(id, medicines);
    }

    pub fn batches_of(&self, manufacturer: &Address) -> Vec<BatchId> {
        self.pharma_batches
            .get(manufacturer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn medicines_of(&self, id: BatchId) -> Vec<MedicineId> {
        self.batch_medicines.get(&id).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}
