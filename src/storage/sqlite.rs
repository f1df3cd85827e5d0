use crate::audit::AuditRecord;
use crate::error::StorageError;
use crate::id::Address;
use crate::objects::{Batch, BatchStatus};
use crate::roles::RoleSet;
use crate::state::StateWrite;
use crate::storage_traits::{Commit, PersistedLedger, RegistryStore};
use anyhow::Context;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, Transaction,
};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::runtime::Runtime;

/// SQL statements, one table per persisted logical table
mod sql {
    pub const SCHEMA: &[&str] = &[
        "CREATE TABLE IF NOT EXISTS roles (
            principal BLOB PRIMARY KEY,
            roles INTEGER NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS address_names (
            address BLOB PRIMARY KEY,
            name TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS pharma_addresses (
            name TEXT PRIMARY KEY,
            addresses BLOB NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS batches (
            id INTEGER PRIMARY KEY,
            status INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS medicine_by_address (
            manufacturer BLOB NOT NULL,
            medicine_id INTEGER NOT NULL,
            batch_id INTEGER NOT NULL,
            PRIMARY KEY (manufacturer, medicine_id)
        )",
        "CREATE TABLE IF NOT EXISTS medicine_by_name (
            name TEXT NOT NULL,
            medicine_id INTEGER NOT NULL,
            batch_id INTEGER NOT NULL,
            PRIMARY KEY (name, medicine_id)
        )",
        "CREATE TABLE IF NOT EXISTS batch_medicines (
            batch_id INTEGER PRIMARY KEY,
            medicines BLOB NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS pharma_batches (
            manufacturer BLOB PRIMARY KEY,
            batches BLOB NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS audit_log (
            sequence INTEGER PRIMARY KEY,
            kind TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            record BLOB NOT NULL
        )",
    ];

    pub const BATCH_COUNTER_KEY: &str = "batch_counter";
}

/// SQLite-backed registry store using sqlx.
///
/// Every commit runs inside a single database transaction.
pub struct SqliteStore {
    pool: SqlitePool,
    rt: Arc<Runtime>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db_path = path.as_ref().to_path_buf();
        let db_url = format!("sqlite:{}", db_path.to_string_lossy());

        // Create a runtime for async operations
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create runtime")?;
        let rt = Arc::new(rt);

        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

        let pool = rt.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await
        })?;

        rt.block_on(Self::initialize_schema(&pool))?;
        log::debug!("Opened sqlite store at {}", db_path.display());

        Ok(Self { pool, rt, db_path })
    }

    /// Creates the necessary tables in the database
    async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        for statement in sql::SCHEMA {
            sqlx::query(statement).execute(pool).await?;
        }
        Ok(())
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
        Ok(bincode::serialize(value)?)
    }

    fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn address_at(row: &SqliteRow, column: usize) -> Result<Address, StorageError> {
        let blob: Vec<u8> = row.try_get(column)?;
        Address::from_slice(&blob)
            .ok_or_else(|| {
                StorageError::Serialization(format!("Invalid address length {}", blob.len()))
            })
    }

    async fn apply_write(
        tx: &mut Transaction<'static, Sqlite>,
        write: &StateWrite,
    ) -> Result<(), StorageError> {
        match write {
            StateWrite::Roles { principal, roles } => {
                sqlx::query("INSERT OR REPLACE INTO roles (principal, roles) VALUES (?, ?)")
                    .bind(principal.to_vec())
                    .bind(roles.bits() as i64)
                    .execute(&mut **tx)
                    .await?;
            }
            StateWrite::AddressName { address, name } => {
                sqlx::query("INSERT OR REPLACE INTO address_names (address, name) VALUES (?, ?)")
                    .bind(address.to_vec())
                    .bind(name.as_str())
                    .execute(&mut **tx)
                    .await?;
            }
            StateWrite::PharmaAddresses { name, addresses } => {
                sqlx::query(
                    "INSERT OR REPLACE INTO pharma_addresses (name, addresses) VALUES (?, ?)",
                )
                .bind(name.as_str())
                .bind(Self::encode(addresses)?)
                .execute(&mut **tx)
                .await?;
            }
            StateWrite::Batch(batch) => {
                sqlx::query(
                    "INSERT OR REPLACE INTO batches (id, status, created_at) VALUES (?, ?, ?)",
                )
                .bind(batch.id as i64)
                .bind(batch.status.to_int())
                .bind(batch.created_at as i64)
                .execute(&mut **tx)
                .await?;
            }
            StateWrite::BatchCounter(counter) => {
                sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
                    .bind(sql::BATCH_COUNTER_KEY)
                    .bind(*counter as i64)
                    .execute(&mut **tx)
                    .await?;
            }
            StateWrite::MedicineByAddress {
                manufacturer,
                medicine_id,
                batch_id,
            } => {
                sqlx::query(
                    "INSERT OR REPLACE INTO medicine_by_address (manufacturer, medicine_id, batch_id)
                     VALUES (?, ?, ?)",
                )
                .bind(manufacturer.to_vec())
                .bind(*medicine_id as i64)
                .bind(*batch_id as i64)
                .execute(&mut **tx)
                .await?;
            }
            StateWrite::MedicineByName {
                name,
                medicine_id,
                batch_id,
            } => {
                sqlx::query(
                    "INSERT OR REPLACE INTO medicine_by_name (name, medicine_id, batch_id)
                     VALUES (?, ?, ?)",
                )
                .bind(name.as_str())
                .bind(*medicine_id as i64)
                .bind(*batch_id as i64)
                .execute(&mut **tx)
                .await?;
            }
            StateWrite::BatchMedicines {
                batch_id,
                medicines,
            } => {
                sqlx::query(
                    "INSERT OR REPLACE INTO batch_medicines (batch_id, medicines) VALUES (?, ?)",
                )
                .bind(*batch_id as i64)
                .bind(Self::encode(medicines)?)
                .execute(&mut **tx)
                .await?;
            }
            StateWrite::PharmaBatches {
                manufacturer,
                batches,
            } => {
                sqlx::query(
                    "INSERT OR REPLACE INTO pharma_batches (manufacturer, batches) VALUES (?, ?)",
                )
                .bind(manufacturer.to_vec())
                .bind(Self::encode(batches)?)
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }

    async fn load_async(&self) -> Result<PersistedLedger, StorageError> {
        let mut writes = Vec::new();

        for row in sqlx::query("SELECT principal, roles FROM roles")
            .fetch_all(&self.pool)
            .await?
        {
            let roles: i64 = row.try_get(1)?;
            writes.push(StateWrite::Roles {
                principal: Self::address_at(&row, 0)?,
                roles: RoleSet::from_bits(roles as u8),
            });
        }

        for row in sqlx::query("SELECT address, name FROM address_names")
            .fetch_all(&self.pool)
            .await?
        {
            writes.push(StateWrite::AddressName {
                address: Self::address_at(&row, 0)?,
                name: row.try_get(1)?,
            });
        }

        for row in sqlx::query("SELECT name, addresses FROM pharma_addresses")
            .fetch_all(&self.pool)
            .await?
        {
            let blob: Vec<u8> = row.try_get(1)?;
            writes.push(StateWrite::PharmaAddresses {
                name: row.try_get(0)?,
                addresses: Self::decode(&blob)?,
            });
        }

        let counter = sqlx::query("SELECT value FROM meta WHERE key = ?")
            .bind(sql::BATCH_COUNTER_KEY)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = counter {
            let value: i64 = row.try_get(0)?;
            writes.push(StateWrite::BatchCounter(value as u64));
        }

        for row in sqlx::query("SELECT id, status, created_at FROM batches ORDER BY id")
            .fetch_all(&self.pool)
            .await?
        {
            let id: i64 = row.try_get(0)?;
            let status: i64 = row.try_get(1)?;
            let created_at: i64 = row.try_get(2)?;
            writes.push(StateWrite::Batch(Batch {
                id: id as u64,
                status: BatchStatus::from_int(status)?,
                created_at: created_at as u64,
            }));
        }

        for row in sqlx::query("SELECT manufacturer, medicine_id, batch_id FROM medicine_by_address")
            .fetch_all(&self.pool)
            .await?
        {
            let medicine_id: i64 = row.try_get(1)?;
            let batch_id: i64 = row.try_get(2)?;
            writes.push(StateWrite::MedicineByAddress {
                manufacturer: Self::address_at(&row, 0)?,
                medicine_id: medicine_id as u64,
                batch_id: batch_id as u64,
            });
        }

        for row in sqlx::query("SELECT name, medicine_id, batch_id FROM medicine_by_name")
            .fetch_all(&self.pool)
            .await?
        {
            let medicine_id: i64 = row.try_get(1)?;
            let batch_id: i64 = row.try_get(2)?;
            writes.push(StateWrite::MedicineByName {
                name: row.try_get(0)?,
                medicine_id: medicine_id as u64,
                batch_id: batch_id as u64,
            });
        }

        for row in sqlx::query("SELECT batch_id, medicines FROM batch_medicines")
            .fetch_all(&self.pool)
            .await?
        {
            let batch_id: i64 = row.try_get(0)?;
            let blob: Vec<u8> = row.try_get(1)?;
            writes.push(StateWrite::BatchMedicines {
                batch_id: batch_id as u64,
                medicines: Self::decode(&blob)?,
            });
        }

        for row in sqlx::query("SELECT manufacturer, batches FROM pharma_batches")
            .fetch_all(&self.pool)
            .await?
        {
            let blob: Vec<u8> = row.try_get(1)?;
            writes.push(StateWrite::PharmaBatches {
                manufacturer: Self::address_at(&row, 0)?,
                batches: Self::decode(&blob)?,
            });
        }

        let mut audit = Vec::new();
        for row in sqlx::query("SELECT record FROM audit_log ORDER BY sequence")
            .fetch_all(&self.pool)
            .await?
        {
            let blob: Vec<u8> = row.try_get(0)?;
            audit.push(Self::decode::<AuditRecord>(&blob)?);
        }

        Ok(PersistedLedger { writes, audit })
    }

    async fn commit_async(&self, commit: &Commit) -> Result<(), StorageError> {
        // Dropping an uncommitted sqlx transaction rolls it back
        let mut tx = self.pool.begin().await?;

        for write in &commit.writes {
            Self::apply_write(&mut tx, write).await?;
        }

        for record in &commit.audit {
            sqlx::query(
                "INSERT INTO audit_log (sequence, kind, timestamp, record) VALUES (?, ?, ?, ?)",
            )
            .bind(record.sequence as i64)
            .bind(record.event.kind())
            .bind(record.timestamp as i64)
            .bind(Self::encode(record)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

impl RegistryStore for SqliteStore {
    fn load(&self) -> Result<PersistedLedger, StorageError> {
        self.rt.block_on(self.load_async())
    }

    fn commit(&self, commit: &Commit) -> Result<(), StorageError> {
        self.rt.block_on(self.commit_async(commit))
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::verify_records;
    use crate::state::LedgerState;
    use crate::storage::fixtures::{expected_state, sample_commits};
    use tempfile::tempdir;

    #[test]
    fn test_commit_and_reload() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("registry.db");

        {
            let store = SqliteStore::new(&db_path).unwrap();
            assert!(store.load().unwrap().is_empty());
            for commit in sample_commits() {
                store.commit(&commit).unwrap();
            }
        }

        let store = SqliteStore::new(&db_path).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(LedgerState::replay(&loaded.writes), expected_state());
        assert_eq!(loaded.audit.len(), 3);
        assert!(verify_records(&loaded.audit).is_ok());
    }

    #[test]
    fn test_failed_commit_is_rolled_back() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("rollback.db")).unwrap();
        let commits = sample_commits();
        store.commit(&commits[0]).unwrap();

        // Re-inserting an existing audit sequence violates the primary key
        let mut conflicting = commits[1].clone();
        conflicting.audit.push(commits[0].audit[0].clone());
        assert!(store.commit(&conflicting).is_err());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.audit, commits[0].audit);
        assert_eq!(
            LedgerState::replay(&loaded.writes),
            LedgerState::replay(&commits[0].writes)
        );
    }
}
