use crate::audit::AuditRecord;
use crate::error::StorageError;
use crate::state::StateWrite;
use crate::storage_traits::{Commit, PersistedLedger, RegistryStore};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};

// Column family names, one per persisted logical table
const CF_ROLES: &str = "roles";
const CF_ADDRESS_NAMES: &str = "address_names";
const CF_PHARMA_ADDRESSES: &str = "pharma_addresses";
const CF_BATCHES: &str = "batches";
const CF_META: &str = "meta";
const CF_MEDICINE_BY_ADDRESS: &str = "medicine_by_address";
const CF_MEDICINE_BY_NAME: &str = "medicine_by_name";
const CF_BATCH_MEDICINES: &str = "batch_medicines";
const CF_PHARMA_BATCHES: &str = "pharma_batches";
const CF_AUDIT_LOG: &str = "audit_log";

/// Column families holding ledger writes, replayed in this order on load
const STATE_FAMILIES: [&str; 9] = [
    CF_ROLES,
    CF_ADDRESS_NAMES,
    CF_PHARMA_ADDRESSES,
    CF_META,
    CF_BATCHES,
    CF_MEDICINE_BY_ADDRESS,
    CF_MEDICINE_BY_NAME,
    CF_BATCH_MEDICINES,
    CF_PHARMA_BATCHES,
];

/// RocksDB-backed registry store.
///
/// Each column family maps a table key to the bincode-encoded latest
/// [`StateWrite`] for that key; every commit is a single `WriteBatch`.
pub struct RocksDbStore {
    db: DB,
    db_path: PathBuf,
}

impl RocksDbStore {
    /// Open or create the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db_path = path.as_ref().to_path_buf();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = STATE_FAMILIES
            .iter()
            .chain(std::iter::once(&CF_AUDIT_LOG))
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, &db_path, descriptors)?;
        log::debug!("Opened rocksdb store at {}", db_path.display());

        Ok(Self { db, db_path })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Database(format!("Missing column family {}", name)))
    }

    /// Column family and key under which a write is stored
    fn locate(write: &StateWrite) -> Result<(&'static str, Vec<u8>), StorageError> {
        let located = match write {
            StateWrite::Roles { principal, .. } => (CF_ROLES, principal.to_vec()),
            StateWrite::AddressName { address, .. } => (CF_ADDRESS_NAMES, address.to_vec()),
            StateWrite::PharmaAddresses { name, .. } => {
                (CF_PHARMA_ADDRESSES, name.as_bytes().to_vec())
            }
            StateWrite::Batch(batch) => (CF_BATCHES, batch.id.to_be_bytes().to_vec()),
            StateWrite::BatchCounter(_) => (CF_META, b"batch_counter".to_vec()),
            StateWrite::MedicineByAddress {
                manufacturer,
                medicine_id,
                ..
            } => (
                CF_MEDICINE_BY_ADDRESS,
                bincode::serialize(&(manufacturer, medicine_id))?,
            ),
            StateWrite::MedicineByName {
                name, medicine_id, ..
            } => (CF_MEDICINE_BY_NAME, bincode::serialize(&(name, medicine_id))?),
            StateWrite::BatchMedicines { batch_id, .. } => {
                (CF_BATCH_MEDICINES, batch_id.to_be_bytes().to_vec())
            }
            StateWrite::PharmaBatches { manufacturer, .. } => {
                (CF_PHARMA_BATCHES, manufacturer.to_vec())
            }
        };
        Ok(located)
    }
}

impl RegistryStore for RocksDbStore {
    fn load(&self) -> Result<PersistedLedger, StorageError> {
        let mut ledger = PersistedLedger::default();

        for name in STATE_FAMILIES {
            for item in self.db.iterator_cf(self.cf(name)?, IteratorMode::Start) {
                let (_, value) = item?;
                ledger.writes.push(bincode::deserialize::<StateWrite>(&value)?);
            }
        }

        // Big-endian sequence keys iterate in append order
        for item in self.db.iterator_cf(self.cf(CF_AUDIT_LOG)?, IteratorMode::Start) {
            let (_, value) = item?;
            ledger.audit.push(bincode::deserialize::<AuditRecord>(&value)?);
        }

        Ok(ledger)
    }

    fn commit(&self, commit: &Commit) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();

        for write in &commit.writes {
            let (family, key) = Self::locate(write)?;
            batch.put_cf(self.cf(family)?, key, bincode::serialize(write)?);
        }

        for record in &commit.audit {
            batch.put_cf(
                self.cf(CF_AUDIT_LOG)?,
                record.sequence.to_be_bytes(),
                bincode::serialize(record)?,
            );
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "rocksdb"
    }
}

impl Debug for RocksDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}
