use crate::audit::AuditEvent;
use crate::directory::Rebind;
use crate::error::{RegistryError, RegistryResult};
use crate::id::{Address, BatchId, MedicineId};
use crate::objects::{Batch, BatchStatus};
use crate::roles::{Authorizer, Role};
use crate::state::{LedgerState, StateWrite};
use log::debug;

/// A unit of work staged against a private copy of the committed ledger.
///
/// Operations validate every precondition before touching the staged state, so a
/// failed operation leaves the transaction as it was. Dropping the transaction
/// discards everything it staged.
#[derive(Debug)]
pub struct Transaction {
    state: LedgerState,
    writes: Vec<StateWrite>,
    events: Vec<AuditEvent>,
    timestamp: u64,
}

impl Transaction {
    pub fn new(base: LedgerState, timestamp: u64) -> Self {
        Self {
            state: base,
            writes: Vec::new(),
            events: Vec::new(),
            timestamp,
        }
    }

    /// The staged state, including this transaction's own writes
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.events.is_empty()
    }

    pub fn into_parts(self) -> (LedgerState, Vec<StateWrite>, Vec<AuditEvent>) {
        (self.state, self.writes, self.events)
    }

    /// Queue an audit event; it is sealed and persisted with this transaction's commit
    fn record(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    /// Install the genesis administrator. Only valid on an empty ledger.
    pub(crate) fn install_admin(&mut self, admin: Address) -> RegistryResult<()> {
        if admin.is_null() {
            return Err(RegistryError::InvalidInput(
                "administrator address is null".to_string(),
            ));
        }
        if let Some(existing) = self.state.roles.admin() {
            return Err(RegistryError::NotAuthorized(format!(
                "administrator already installed: {}",
                existing
            )));
        }
        self.grant_unchecked(Role::Administrator, admin);
        Ok(())
    }

    /// Grant Manufacturer or Referee to `principal`. Administrator only.
    pub fn grant(
        &mut self,
        caller: &Address,
        role: Role,
        principal: Address,
    ) -> RegistryResult<()> {
        self.state.roles.require(Role::Administrator, caller)?;
        if principal.is_null() {
            return Err(RegistryError::InvalidInput("cannot grant to the null address".to_string()));
        }
        if role == Role::Administrator {
            return Err(RegistryError::InvalidInput(
                "the administrator role is assigned only at genesis".to_string(),
            ));
        }
        self.grant_unchecked(role, principal);
        Ok(())
    }

    fn grant_unchecked(&mut self, role: Role, principal: Address) {
        let roles = self.state.roles.grant(role, principal);
        self.writes.push(StateWrite::Roles { principal, roles });
        self.record(AuditEvent::RoleGranted { role, principal });
    }

    /// Bind `address` to the display `name` and make it a manufacturer.
    /// Administrator only.
    pub fn bind_name(
        &mut self,
        caller: &Address,
        address: Address,
        name: &str,
    ) -> RegistryResult<()> {
        self.state.roles.require(Role::Administrator, caller)?;
        if address.is_null() {
            return Err(RegistryError::InvalidInput("cannot bind the null address".to_string()));
        }
        if name.is_empty() {
            return Err(RegistryError::InvalidInput("name must not be empty".to_string()));
        }

        match self.state.directory.bind(address, name) {
            Rebind::Unchanged => {}
            outcome => {
                if let Rebind::Moved(prior) = outcome {
                    debug!("Moving {} from {:?} to {:?}", address, prior, name);
                    let addresses = self.state.directory.addresses_of(&prior);
                    self.writes.push(StateWrite::PharmaAddresses {
                        name: prior,
                        addresses,
                    });
                }
                self.writes.push(StateWrite::PharmaAddresses {
                    name: name.to_string(),
                    addresses: self.state.directory.addresses_of(name),
                });
                self.writes.push(StateWrite::AddressName {
                    address,
                    name: name.to_string(),
                });
            }
        }

        if !self.state.roles.has_role(Role::Manufacturer, &address) {
            self.grant_unchecked(Role::Manufacturer, address);
        }
        self.record(AuditEvent::NameBound {
            address,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Record a new batch for `manufacturer` producing `medicine_ids`.
    ///
    /// The caller must be the manufacturer itself or the administrator. Either the
    /// whole batch with both index entries per medicine is staged, or nothing is.
    pub fn create_batch(
        &mut self,
        caller: &Address,
        manufacturer: Address,
        medicine_ids: &[MedicineId],
    ) -> RegistryResult<BatchId> {
        if *caller != manufacturer && !self.state.roles.is_admin(caller) {
            return Err(RegistryError::NotAuthorized(format!(
                "{} may not create batches for {}",
                caller, manufacturer
            )));
        }
        self.state.roles.require(Role::Manufacturer, &manufacturer)?;
        let name = match self.state.directory.bound_name(&manufacturer) {
            Some(name) => name.to_string(),
            None => return Err(RegistryError::NameNotSet(manufacturer.to_string())),
        };
        if let Some(position) = medicine_ids.iter().position(|id| *id == 0) {
            return Err(RegistryError::InvalidMedicineId(position));
        }

        let batch_id = self.state.batches.allocate_id();
        self.writes.push(StateWrite::BatchCounter(batch_id));

        let batch = Batch::new(batch_id, self.timestamp);
        self.state.batches.put_batch(batch.clone());
        self.writes.push(StateWrite::Batch(batch));

        for &medicine_id in medicine_ids {
            self.state
                .index
                .put_by_address(manufacturer, medicine_id, batch_id);
            self.state
                .index
                .put_by_name(name.clone(), medicine_id, batch_id);
            self.writes.push(StateWrite::MedicineByAddress {
                manufacturer,
                medicine_id,
                batch_id,
            });
            self.writes.push(StateWrite::MedicineByName {
                name: name.clone(),
                medicine_id,
                batch_id,
            });
            self.record(AuditEvent::MedicineInBatch {
                medicine_id,
                batch_id,
                manufacturer,
            });
        }

        self.state
            .batches
            .put_batch_medicines(batch_id, medicine_ids.to_vec());
        self.writes.push(StateWrite::BatchMedicines {
            batch_id,
            medicines: medicine_ids.to_vec(),
        });

        let batches = self
            .state
            .batches
            .append_pharma_batch(manufacturer, batch_id)
            .to_vec();
        self.writes.push(StateWrite::PharmaBatches {
            manufacturer,
            batches,
        });

        self.record(AuditEvent::BatchCreated {
            batch_id,
            manufacturer,
            name,
            timestamp: self.timestamp,
        });
        Ok(batch_id)
    }

    /// Overwrite the status of an existing batch. Referee only.
    pub fn set_status(
        &mut self,
        caller: &Address,
        batch_id: BatchId,
        status: BatchStatus,
    ) -> RegistryResult<()> {
        self.state.roles.require(Role::Referee, caller)?;
        self.update_status(batch_id, status)
    }

    /// Disable the batch that produced `medicine_id` under the manufacturer
    /// name `pharma_name`. Referee only.
    pub fn set_status_by_name(
        &mut self,
        caller: &Address,
        pharma_name: &str,
        medicine_id: MedicineId,
    ) -> RegistryResult<BatchId> {
        self.state.roles.require(Role::Referee, caller)?;
        let batch_id = self
            .state
            .index
            .batch_of_by_name(pharma_name, medicine_id)
            .ok_or_else(|| {
                RegistryError::BatchNotFound(format!(
                    "no batch for medicine {} of {:?}",
                    medicine_id, pharma_name
                ))
            })?;

        self.update_status(batch_id, BatchStatus::Disabled)?;
        self.record(AuditEvent::MedicineRevoked {
            name: pharma_name.to_string(),
            medicine_id,
            batch_id,
        });
        Ok(batch_id)
    }

    fn update_status(&mut self, batch_id: BatchId, status: BatchStatus) -> RegistryResult<()> {
        let batch = self
            .state
            .batches
            .set_status(batch_id, status)
            .cloned()
            .ok_or_else(|| RegistryError::BatchNotFound(format!("batch {}", batch_id)))?;
        self.writes.push(StateWrite::Batch(batch));
        self.record(AuditEvent::StatusUpdated { batch_id, status });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::tests::addr;

    fn genesis() -> (Transaction, Address) {
        let admin = addr("admin");
        let mut tx = Transaction::new(LedgerState::new(), 1_000);
        tx.install_admin(admin).unwrap();
        (tx, admin)
    }

    #[test]
    fn test_install_admin_once() {
        let (mut tx, _) = genesis();
        assert!(matches!(
            tx.install_admin(addr("other")),
            Err(RegistryError::NotAuthorized(_))
        ));

        let mut fresh = Transaction::new(LedgerState::new(), 0);
        assert!(matches!(
            fresh.install_admin(Address::null()),
            Err(RegistryError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_grant_rules() {
        let (mut tx, admin) = genesis();
        let referee = addr("referee");

        assert!(matches!(
            tx.grant(&referee, Role::Referee, referee),
            Err(RegistryError::NotAuthorized(_))
        ));
        assert!(matches!(
            tx.grant(&admin, Role::Referee, Address::null()),
            Err(RegistryError::InvalidInput(_))
        ));
        assert!(matches!(
            tx.grant(&admin, Role::Administrator, referee),
            Err(RegistryError::InvalidInput(_))
        ));

        tx.grant(&admin, Role::Referee, referee).unwrap();
        assert!(tx.state().roles.has_role(Role::Referee, &referee));
    }

    #[test]
    fn test_bind_name_grants_manufacturer() {
        let (mut tx, admin) = genesis();
        let acme = addr("acme");

        tx.bind_name(&admin, acme, "Acme").unwrap();
        assert!(tx.state().roles.has_role(Role::Manufacturer, &acme));
        assert_eq!(tx.state().directory.name_of(&acme), "Acme");

        let (_, writes, events) = tx.into_parts();
        assert!(writes.contains(&StateWrite::AddressName {
            address: acme,
            name: "Acme".to_string()
        }));
        assert!(matches!(events.last(), Some(AuditEvent::NameBound { .. })));
    }

    #[test]
    fn test_bind_name_validation() {
        let (mut tx, admin) = genesis();
        let acme = addr("acme");

        assert!(matches!(
            tx.bind_name(&acme, acme, "Acme"),
            Err(RegistryError::NotAuthorized(_))
        ));
        assert!(matches!(
            tx.bind_name(&admin, Address::null(), "Acme"),
            Err(RegistryError::InvalidInput(_))
        ));
        assert!(matches!(
            tx.bind_name(&admin, acme, ""),
            Err(RegistryError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rebind_writes_old_list() {
        let (mut tx, admin) = genesis();
        let acme = addr("acme");
        tx.bind_name(&admin, acme, "Acme").unwrap();
        tx.bind_name(&admin, acme, "Globex").unwrap();

        let (state, writes, _) = tx.into_parts();
        assert!(writes.contains(&StateWrite::PharmaAddresses {
            name: "Acme".to_string(),
            addresses: vec![],
        }));
        assert_eq!(state.directory.addresses_of("Globex"), vec![acme]);
        assert_eq!(LedgerState::replay(&writes), state);
    }

    #[test]
    fn test_create_batch_failures_leave_stage_untouched() {
        let (mut tx, admin) = genesis();
        let acme = addr("acme");
        let stranger = addr("stranger");
        tx.grant(&admin, Role::Manufacturer, acme).unwrap();
        let before = tx.state().clone();

        assert!(matches!(
            tx.create_batch(&acme, acme, &[1, 2]),
            Err(RegistryError::NameNotSet(_))
        ));

        tx.bind_name(&admin, acme, "Acme").unwrap();
        let before_bound = tx.state().clone();
        assert_ne!(before, before_bound);

        assert!(matches!(
            tx.create_batch(&stranger, acme, &[1]),
            Err(RegistryError::NotAuthorized(_))
        ));
        assert!(matches!(
            tx.create_batch(&acme, acme, &[1, 0, 3]),
            Err(RegistryError::InvalidMedicineId(1))
        ));
        assert_eq!(tx.state(), &before_bound);
    }

    #[test]
    fn test_admin_creates_on_behalf() {
        let (mut tx, admin) = genesis();
        let acme = addr("acme");
        tx.bind_name(&admin, acme, "Acme").unwrap();

        let id = tx.create_batch(&admin, acme, &[7]).unwrap();
        assert_eq!(id, 1);
        assert_eq!(tx.state().batches.batches_of(&acme), vec![1]);
        assert!(tx.state().batches.batches_of(&admin).is_empty());
    }

    #[test]
    fn test_create_batch_events() {
        let (mut tx, admin) = genesis();
        let acme = addr("acme");
        tx.bind_name(&admin, acme, "Acme").unwrap();
        let (state, _, _) = tx.into_parts();

        let mut tx = Transaction::new(state, 2_000);
        tx.create_batch(&acme, acme, &[10, 20]).unwrap();
        let (_, _, events) = tx.into_parts();

        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec!["medicine-in-batch", "medicine-in-batch", "batch-created"]
        );
        assert_eq!(
            events[2],
            AuditEvent::BatchCreated {
                batch_id: 1,
                manufacturer: acme,
                name: "Acme".to_string(),
                timestamp: 2_000,
            }
        );
    }

    #[test]
    fn test_set_status_requires_referee_and_batch() {
        let (mut tx, admin) = genesis();
        let acme = addr("acme");
        let referee = addr("referee");
        tx.bind_name(&admin, acme, "Acme").unwrap();
        tx.grant(&admin, Role::Referee, referee).unwrap();
        tx.create_batch(&acme, acme, &[10]).unwrap();

        assert!(matches!(
            tx.set_status(&admin, 1, BatchStatus::Disabled),
            Err(RegistryError::NotAuthorized(_))
        ));
        assert!(matches!(
            tx.set_status(&referee, 2, BatchStatus::Disabled),
            Err(RegistryError::BatchNotFound(_))
        ));
        assert!(matches!(
            tx.set_status(&referee, 0, BatchStatus::Disabled),
            Err(RegistryError::BatchNotFound(_))
        ));

        for status in [
            BatchStatus::InRevision,
            BatchStatus::InRevision,
            BatchStatus::Disabled,
            BatchStatus::Enabled,
        ] {
            tx.set_status(&referee, 1, status).unwrap();
            assert_eq!(tx.state().batches.get(1).map(|b| b.status), Some(status));
        }
    }

    #[test]
    fn test_set_status_by_name() {
        let (mut tx, admin) = genesis();
        let acme = addr("acme");
        let referee = addr("referee");
        tx.bind_name(&admin, acme, "Acme").unwrap();
        tx.grant(&admin, Role::Referee, referee).unwrap();
        tx.create_batch(&acme, acme, &[10, 20]).unwrap();

        assert!(matches!(
            tx.set_status_by_name(&referee, "Acme", 99),
            Err(RegistryError::BatchNotFound(_))
        ));
        assert!(matches!(
            tx.set_status_by_name(&acme, "Acme", 10),
            Err(RegistryError::NotAuthorized(_))
        ));

        assert_eq!(tx.set_status_by_name(&referee, "Acme", 20).unwrap(), 1);
        let state = tx.state();
        assert!(state.index.is_invalid(&state.batches, &acme, 10));
        assert!(state.index.is_invalid_by_name(&state.batches, "Acme", 10));
    }
}
