use crate::id::Address;
use std::collections::HashMap;

/// Outcome of binding an address to a display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rebind {
    /// The address had no name before
    Fresh,
    /// The address was already bound to the same name; nothing changed
    Unchanged,
    /// The address moved away from the named previous binding
    Moved(String),
}

/// Manufacturer display names and the addresses bound to them.
///
/// A name may carry many addresses; an address belongs to at most one name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PharmaDirectory {
    addresses: HashMap<String, Vec<Address>>,
    names: HashMap<Address, String>,
}

impl PharmaDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `address` to `name`.
    ///
    /// An address already bound to another name is removed from that name's list
    /// so no stale entry survives the move.
    pub fn bind(&mut self, address: Address, name: &str) -> Rebind {
        let outcome = match self.names.get(&address) {
            Some(prior) if prior == name => return Rebind::Unchanged,
            Some(prior) => Rebind::Moved(prior.clone()),
            None => Rebind::Fresh,
        };

        if let Rebind::Moved(prior) = &outcome {
            if let Some(list) = self.addresses.get_mut(prior) {
                list.retain(|a| *a != address);
            }
        }

        self.addresses
            .entry(name.to_string())
            .or_default()
            .push(address);
        self.names.insert(address, name.to_string());
        outcome
    }

    pub fn put_name(&mut self, address: Address, name: String) {
        self.names.insert(address, name);
    }

    pub fn put_addresses(&mut self, name: String, addresses: Vec<Address>) {
        self.addresses.insert(name, addresses);
    }

    /// Bound name, or the empty string when unbound
    pub fn name_of(&self, address: &Address) -> String {
        self.names.get(address).cloned().unwrap_or_default()
    }

    pub fn bound_name(&self, address: &Address) -> Option<&str> {
        self.names.get(address).map(String::as_str)
    }

    /// Addresses bound to `name`, in binding order
    pub fn addresses_of(&self, name: &str) -> Vec<Address> {
        self.addresses.get(name).cloned().unwrap_or_default()
    }
}
