use crate::audit::{AuditLog, AuditRecord};
use crate::clock::{Clock, SystemClock};
use crate::config::{open_store, RegistryConfig};
use crate::error::RegistryResult;
use crate::id::{Address, BatchId, MedicineId};
use crate::objects::{Batch, BatchStatus};
use crate::roles::{Authorizer, Role, RoleSet};
use crate::state::LedgerState;
use crate::storage::{Commit, MemoryStore, RegistryStore};
use crate::transaction::Transaction;
use log::{debug, error, info, warn};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, RwLock};

/// The batch registry service.
///
/// Mutations are serialized through one writer lock and staged on a private copy
/// of the ledger; a transaction becomes visible only after the store has accepted
/// it. Queries read the last committed snapshot and never wait on writers.
pub struct Registry {
    store: Box<dyn RegistryStore>,
    committed: RwLock<Arc<LedgerState>>,
    writer: Mutex<()>,
    audit: AuditLog,
    clock: Arc<dyn Clock>,
}

impl Registry {
    /// Open the registry on `store`.
    ///
    /// An empty store is initialized with `admin` as the genesis administrator.
    /// A populated store is replayed as is and keeps its persisted administrator.
    pub fn open(
        store: Box<dyn RegistryStore>,
        admin: Address,
        clock: Arc<dyn Clock>,
    ) -> RegistryResult<Self> {
        let persisted = store.load()?;
        let fresh = persisted.is_empty();

        let state = LedgerState::replay(&persisted.writes);
        let audit = AuditLog::from_records(persisted.audit)?;

        let registry = Self {
            store,
            committed: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            audit,
            clock,
        };

        if fresh {
            registry.transact(|tx| tx.install_admin(admin))?;
            info!(
                "Initialized {} registry with administrator {}",
                registry.store.backend_name(),
                admin
            );
        } else {
            let snapshot = registry.snapshot();
            match snapshot.roles.admin() {
                Some(existing) if existing != admin => warn!(
                    "Ignoring configured administrator {}; ledger already belongs to {}",
                    admin, existing
                ),
                None => warn!("Persisted ledger has no administrator"),
                _ => {}
            }
            info!(
                "Opened {} registry with {} batches and {} audit records",
                registry.store.backend_name(),
                snapshot.batches.len(),
                registry.audit.len()
            );
        }

        Ok(registry)
    }

    /// Volatile registry on the wall clock, mostly for tests and tooling
    pub fn in_memory(admin: Address) -> RegistryResult<Self> {
        Self::open(Box::new(MemoryStore::new()), admin, Arc::new(SystemClock))
    }

    pub fn from_config(config: &RegistryConfig) -> RegistryResult<Self> {
        let admin = config.admin_address()?;
        let store = open_store(&config.backend)?;
        Self::open(store, admin, Arc::new(SystemClock))
    }

    /// The last committed ledger state
    pub fn snapshot(&self) -> Arc<LedgerState> {
        self.committed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Run `f` as one all-or-nothing unit of work.
    ///
    /// If `f` fails, or the store rejects the commit, nothing it staged becomes
    /// visible and no audit record is appended.
    pub fn transact<T>(
        &self,
        f: impl FnOnce(&mut Transaction) -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        // Work is staged on a copy, so a panic in an earlier closure left nothing torn
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let base = self.snapshot();
        let mut tx = Transaction::new((*base).clone(), self.clock.now());

        let output = match f(&mut tx) {
            Ok(output) => output,
            Err(e) => {
                warn!("Transaction aborted ({}): {}", e.kind(), e);
                return Err(e);
            }
        };

        if tx.is_empty() {
            return Ok(output);
        }

        let timestamp = tx.timestamp();
        let (state, writes, events) = tx.into_parts();
        let commit = Commit {
            writes,
            audit: self.audit.seal(events, timestamp)?,
        };

        if let Err(e) = self.store.commit(&commit) {
            warn!("Store rejected commit: {}", e);
            return Err(e.into());
        }

        *self.committed.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(state);
        debug!(
            "Committed {} writes and {} audit records",
            commit.writes.len(),
            commit.audit.len()
        );
        // The commit is durable; the in-memory feed catches up on the next open
        if let Err(e) = self.audit.append(commit.audit) {
            error!("Audit feed out of step with the store: {}", e);
        }
        Ok(output)
    }

    pub fn grant(&self, caller: &Address, role: Role, principal: Address) -> RegistryResult<()> {
        self.transact(|tx| tx.grant(caller, role, principal))
    }

    pub fn grant_manufacturer(&self, caller: &Address, principal: Address) -> RegistryResult<()> {
        self.grant(caller, Role::Manufacturer, principal)
    }

    pub fn grant_referee(&self, caller: &Address, principal: Address) -> RegistryResult<()> {
        self.grant(caller, Role::Referee, principal)
    }

    pub fn bind_name(&self, caller: &Address, address: Address, name: &str) -> RegistryResult<()> {
        self.transact(|tx| tx.bind_name(caller, address, name))?;
        info!("Bound {} to {:?}", address, name);
        Ok(())
    }

    pub fn create_batch(
        &self,
        caller: &Address,
        manufacturer: Address,
        medicine_ids: &[MedicineId],
    ) -> RegistryResult<BatchId> {
        let batch_id = self.transact(|tx| tx.create_batch(caller, manufacturer, medicine_ids))?;
        info!(
            "Created batch {} for {} with {} medicines",
            batch_id,
            manufacturer,
            medicine_ids.len()
        );
        Ok(batch_id)
    }

    pub fn set_status(
        &self,
        caller: &Address,
        batch_id: BatchId,
        status: BatchStatus,
    ) -> RegistryResult<()> {
        self.transact(|tx| tx.set_status(caller, batch_id, status))?;
        info!("Batch {} is now {}", batch_id, status);
        Ok(())
    }

    /// Disable the batch behind `medicine_id` of manufacturer `pharma_name`
    pub fn set_status_by_name(
        &self,
        caller: &Address,
        pharma_name: &str,
        medicine_id: MedicineId,
    ) -> RegistryResult<BatchId> {
        let batch_id = self.transact(|tx| tx.set_status_by_name(caller, pharma_name, medicine_id))?;
        info!(
            "Revoked batch {} through medicine {} of {:?}",
            batch_id, medicine_id, pharma_name
        );
        Ok(batch_id)
    }

    pub fn name_of(&self, address: &Address) -> String {
        self.snapshot().directory.name_of(address)
    }

    pub fn addresses_of(&self, name: &str) -> Vec<Address> {
        self.snapshot().directory.addresses_of(name)
    }

    pub fn is_invalid(&self, manufacturer: &Address, medicine_id: MedicineId) -> bool {
        let state = self.snapshot();
        state.index.is_invalid(&state.batches, manufacturer, medicine_id)
    }

    pub fn is_invalid_by_name(&self, pharma_name: &str, medicine_id: MedicineId) -> bool {
        let state = self.snapshot();
        state
            .index
            .is_invalid_by_name(&state.batches, pharma_name, medicine_id)
    }

    pub fn batch(&self, batch_id: BatchId) -> Option<Batch> {
        self.snapshot().batches.get(batch_id).cloned()
    }

    pub fn batches_of(&self, manufacturer: &Address) -> Vec<BatchId> {
        self.snapshot().batches.batches_of(manufacturer)
    }

    pub fn medicines_of(&self, batch_id: BatchId) -> Vec<MedicineId> {
        self.snapshot().batches.medicines_of(batch_id)
    }

    pub fn batch_of_medicine(
        &self,
        manufacturer: &Address,
        medicine_id: MedicineId,
    ) -> Option<BatchId> {
        self.snapshot().index.batch_of(manufacturer, medicine_id)
    }

    pub fn batch_of_medicine_by_name(
        &self,
        pharma_name: &str,
        medicine_id: MedicineId,
    ) -> Option<BatchId> {
        self.snapshot().index.batch_of_by_name(pharma_name, medicine_id)
    }

    pub fn roles_of(&self, principal: &Address) -> RoleSet {
        self.snapshot().roles.roles_of(principal)
    }

    pub fn has_role(&self, role: Role, principal: &Address) -> bool {
        self.snapshot().roles.has_role(role, principal)
    }

    pub fn is_admin(&self, principal: &Address) -> bool {
        self.snapshot().roles.is_admin(principal)
    }

    pub fn admin(&self) -> Option<Address> {
        self.snapshot().roles.admin()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Audit records at or after `from_sequence`
    pub fn poll_audit(&self, from_sequence: u64) -> Vec<AuditRecord> {
        self.audit.poll(from_sequence)
    }

    pub fn subscribe(&self) -> Receiver<AuditRecord> {
        self.audit.subscribe()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("store", &self.store)
            .field("audit_len", &self.audit.len())
            .finish()
    }
}
