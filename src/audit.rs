//! Append-only, hash-chained audit trail of registry state transitions.
//!
//! Every committed transaction appends its events in order. Each record commits to
//! its predecessor through a BLAKE3 hash, so rewriting, dropping or reordering any
//! record breaks [`AuditLog::verify_chain`].

use crate::error::StorageError;
use crate::id::{Address, BatchId, MedicineId};
use crate::objects::BatchStatus;
use crate::roles::Role;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, RwLock};

/// Hash of the (nonexistent) record before sequence 0
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// A state transition observed by external consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    BatchCreated {
        batch_id: BatchId,
        manufacturer: Address,
        name: String,
        timestamp: u64,
    },
    MedicineInBatch {
        medicine_id: MedicineId,
        batch_id: BatchId,
        manufacturer: Address,
    },
    StatusUpdated {
        batch_id: BatchId,
        status: BatchStatus,
    },
    MedicineRevoked {
        name: String,
        medicine_id: MedicineId,
        batch_id: BatchId,
    },
    NameBound {
        address: Address,
        name: String,
    },
    RoleGranted {
        role: Role,
        principal: Address,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::BatchCreated { .. } => "batch-created",
            AuditEvent::MedicineInBatch { .. } => "medicine-in-batch",
            AuditEvent::StatusUpdated { .. } => "status-updated",
            AuditEvent::MedicineRevoked { .. } => "medicine-revoked",
            AuditEvent::NameBound { .. } => "name-bound",
            AuditEvent::RoleGranted { .. } => "role-granted",
        }
    }
}

/// An immutable, sealed entry of the audit trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the trail, starting at 0
    pub sequence: u64,

    /// Unix timestamp (seconds) of the commit that produced this record
    pub timestamp: u64,

    pub event: AuditEvent,

    /// Hash of the previous record, or [`GENESIS_HASH`] for the first one
    pub prev_hash: [u8; 32],

    pub hash: [u8; 32],
}

impl AuditRecord {
    /// Seal `event` onto the chain after `prev_hash`
    pub fn seal(
        prev_hash: [u8; 32],
        sequence: u64,
        timestamp: u64,
        event: AuditEvent,
    ) -> Result<Self, StorageError> {
        let hash = Self::compute_hash(&prev_hash, sequence, timestamp, &event)?;
        Ok(Self {
            sequence,
            timestamp,
            event,
            prev_hash,
            hash,
        })
    }

    fn compute_hash(
        prev_hash: &[u8; 32],
        sequence: u64,
        timestamp: u64,
        event: &AuditEvent,
    ) -> Result<[u8; 32], StorageError> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"PHARMA_Audit");
        hasher.update(prev_hash);
        hasher.update(&sequence.to_le_bytes());
        hasher.update(&timestamp.to_le_bytes());
        hasher.update(&bincode::serialize(event)?);
        Ok(*hasher.finalize().as_bytes())
    }

    /// Whether the stored hash matches the record's contents
    pub fn is_intact(&self) -> Result<bool, StorageError> {
        let expected =
            Self::compute_hash(&self.prev_hash, self.sequence, self.timestamp, &self.event)?;
        Ok(expected == self.hash)
    }
}

/// Check that `records` form an unbroken chain starting at sequence 0
pub fn verify_records(records: &[AuditRecord]) -> Result<(), StorageError> {
    let mut prev_hash = GENESIS_HASH;
    for (position, record) in records.iter().enumerate() {
        if record.sequence != position as u64
            || record.prev_hash != prev_hash
            || !record.is_intact()?
        {
            return Err(StorageError::AuditChainInvalid(position as u64));
        }
        prev_hash = record.hash;
    }
    Ok(())
}

/// In-process audit trail with poll and subscribe access
#[derive(Debug, Default)]
pub struct AuditLog {
    records: RwLock<Vec<AuditRecord>>,
    subscribers: Mutex<Vec<Sender<AuditRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted records, refusing a broken chain
    pub fn from_records(records: Vec<AuditRecord>) -> Result<Self, StorageError> {
        verify_records(&records)?;
        Ok(Self {
            records: RwLock::new(records),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Next sequence number and the hash the next record must link to
    pub fn head(&self) -> (u64, [u8; 32]) {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        match records.last() {
            Some(last) => (last.sequence + 1, last.hash),
            None => (0, GENESIS_HASH),
        }
    }

    /// Seal `events` as the next records without appending them.
    ///
    /// Only the registry writer may seal, so the head cannot move before `append`.
    pub(crate) fn seal(
        &self,
        events: Vec<AuditEvent>,
        timestamp: u64,
    ) -> Result<Vec<AuditRecord>, StorageError> {
        let (mut sequence, mut prev_hash) = self.head();
        let mut sealed = Vec::with_capacity(events.len());
        for event in events {
            let record = AuditRecord::seal(prev_hash, sequence, timestamp, event)?;
            prev_hash = record.hash;
            sequence += 1;
            sealed.push(record);
        }
        Ok(sealed)
    }

    /// Append already-sealed records and notify subscribers.
    ///
    /// Records must continue the current chain.
    pub(crate) fn append(&self, sealed: Vec<AuditRecord>) -> Result<(), StorageError> {
        if sealed.is_empty() {
            return Ok(());
        }

        {
            let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
            let (expected_sequence, expected_prev) = match records.last() {
                Some(last) => (last.sequence + 1, last.hash),
                None => (0, GENESIS_HASH),
            };
            if sealed[0].sequence != expected_sequence || sealed[0].prev_hash != expected_prev {
                return Err(StorageError::AuditChainInvalid(sealed[0].sequence));
            }
            records.extend(sealed.iter().cloned());
        }

        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| sealed.iter().all(|record| tx.send(record.clone()).is_ok()));
        debug!(
            "Appended {} audit records, {} subscribers",
            sealed.len(),
            subscribers.len()
        );
        Ok(())
    }

    /// Records with a sequence number at or after `from_sequence`
    pub fn poll(&self, from_sequence: u64) -> Vec<AuditRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let start = (from_sequence as usize).min(records.len());
        records[start..].to_vec()
    }

    /// Live feed of every record appended after this call
    pub fn subscribe(&self) -> Receiver<AuditRecord> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn verify_chain(&self) -> Result<(), StorageError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        verify_records(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::tests::addr;

    /// Seal and append a single event
    fn record(log: &AuditLog, event: AuditEvent, timestamp: u64) -> AuditRecord {
        let sealed = log.seal(vec![event], timestamp).unwrap();
        log.append(sealed.clone()).unwrap();
        sealed[0].clone()
    }

    fn bound(name: &str) -> AuditEvent {
        AuditEvent::NameBound {
            address: addr(name),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_record_and_poll() {
        let log = AuditLog::new();
        record(&log, bound("Acme"), 10);
        record(
            &log,
            AuditEvent::StatusUpdated {
                batch_id: 1,
                status: BatchStatus::Disabled,
            },
            11,
        );

        assert_eq!(log.len(), 2);
        let tail = log.poll(1);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].sequence, 1);
        assert_eq!(tail[0].event.kind(), "status-updated");
        assert!(log.poll(5).is_empty());
        assert!(log.verify_chain().is_ok());
    }

    #[test]
    fn test_chain_links() {
        let log = AuditLog::new();
        let first = record(&log, bound("Acme"), 1);
        let second = record(&log, bound("Globex"), 2);

        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(log.head(), (2, second.hash));
    }

    #[test]
    fn test_tampering_is_detected() {
        let log = AuditLog::new();
        record(&log, bound("Acme"), 1);
        record(&log, bound("Globex"), 2);

        let mut records = log.poll(0);
        records[0].event = bound("Initech");
        match AuditLog::from_records(records) {
            Err(StorageError::AuditChainInvalid(0)) => {}
            other => panic!("expected broken chain, got {:?}", other.map(|l| l.len())),
        }

        let mut records = log.poll(0);
        records.remove(0);
        assert!(verify_records(&records).is_err());
    }

    #[test]
    fn test_out_of_order_append_is_rejected() {
        let log = AuditLog::new();
        let sealed = log.seal(vec![bound("Acme"), bound("Globex")], 3).unwrap();
        assert!(log.append(vec![sealed[1].clone()]).is_err());
        assert!(log.is_empty());

        log.append(sealed).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_subscribe_receives_new_records() {
        let log = AuditLog::new();
        record(&log, bound("Acme"), 1);

        let rx = log.subscribe();
        record(&log, bound("Globex"), 2);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.sequence, 1);
        assert!(rx.try_recv().is_err());

        drop(rx);
        // A dropped subscriber is pruned instead of failing the append
        record(&log, bound("Initech"), 3);
        assert_eq!(log.len(), 3);
    }
}
