use crate::error::{RegistryError, RegistryResult};
use crate::id::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Roles a principal can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    Manufacturer,
    Referee,
}

impl Role {
    const ALL: [Role; 3] = [Role::Administrator, Role::Manufacturer, Role::Referee];

    fn bit(self) -> u8 {
        match self {
            Role::Administrator => 0b001,
            Role::Manufacturer => 0b010,
            Role::Referee => 0b100,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Administrator => "administrator",
            Role::Manufacturer => "manufacturer",
            Role::Referee => "referee",
        };
        f.write_str(name)
    }
}

/// Tagged set of roles held by one principal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(u8);

impl RoleSet {
    pub fn empty() -> Self {
        RoleSet(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        RoleSet(bits & 0b111)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn with(self, role: Role) -> Self {
        RoleSet(self.0 | role.bit())
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

/// Authorization capability consulted by every mutating operation
pub trait Authorizer {
    /// Whether `principal` currently holds `role`
    fn has_role(&self, role: Role, principal: &Address) -> bool;

    fn is_admin(&self, principal: &Address) -> bool {
        self.has_role(Role::Administrator, principal)
    }

    /// Fail with `NotAuthorized` unless `principal` holds `role`
    fn require(&self, role: Role, principal: &Address) -> RegistryResult<()> {
        if self.has_role(role, principal) {
            Ok(())
        } else {
            Err(RegistryError::NotAuthorized(format!(
                "{} does not hold the {} role",
                principal, role
            )))
        }
    }
}

/// Role memberships keyed by principal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleManager {
    members: HashMap<Address, RoleSet>,
}

impl RoleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `role` to the principal's set and return the resulting set
    pub fn grant(&mut self, role: Role, principal: Address) -> RoleSet {
        let entry = self.members.entry(principal).or_default();
        *entry = entry.with(role);
        *entry
    }

    /// Replace the principal's whole set, used when replaying persisted state
    pub fn put(&mut self, principal: Address, roles: RoleSet) {
        if roles.is_empty() {
            self.members.remove(&principal);
        } else {
            self.members.insert(principal, roles);
        }
    }

    pub fn roles_of(&self, principal: &Address) -> RoleSet {
        self.members.get(principal).copied().unwrap_or_default()
    }

    /// The genesis administrator, if one has been installed
    pub fn admin(&self) -> Option<Address> {
        self.members
            .iter()
            .find(|(_, roles)| roles.contains(Role::Administrator))
            .map(|(address, _)| *address)
    }
}

impl Authorizer for RoleManager {
    fn has_role(&self, role: Role, principal: &Address) -> bool {
        self.roles_of(principal).contains(role)
    }
}
