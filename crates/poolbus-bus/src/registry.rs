//! ---
//! pb_section: "02-messaging-ipc-data-model"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Address to handler registry with singleton role tracking."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::sync::Arc;

use poolbus_proto::RawMessage;
use strum::Display;

use crate::{BusError, Result};

/// Kind of equipment behind an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeviceRole {
    /// Automation controller, bus master when present.
    Controller,
    /// Variable-speed pump.
    Pump,
    /// Salt chlorinator on the secondary framing.
    Chlorinator,
    /// Chemistry monitor.
    ChemistryMonitor,
}

impl DeviceRole {
    /// Only one device of this role may be registered per bus.
    pub fn is_singleton(&self) -> bool {
        matches!(self, DeviceRole::Controller | DeviceRole::Chlorinator)
    }
}

/// Receiver of messages from one bus address.
///
/// `handle` runs on the reader thread and must return promptly.
pub trait DeviceHandler: Send + Sync {
    /// Role used for singleton checks and online tracking.
    fn role(&self) -> DeviceRole;

    /// Consume a message whose source is this handler's address.
    fn handle(&self, message: &RawMessage);

    /// True while the device refuses remote commands. Only controllers report this.
    fn service_mode(&self) -> bool {
        false
    }
}

struct Entry {
    handler: Arc<dyn DeviceHandler>,
    online: bool,
}

/// Registered handlers keyed by bus address.
#[derive(Default)]
pub struct DeviceRegistry {
    entries: BTreeMap<u8, Entry>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler, enforcing address uniqueness and singleton roles.
    pub fn insert(&mut self, address: u8, handler: Arc<dyn DeviceHandler>) -> Result<()> {
        if self.entries.contains_key(&address) {
            return Err(BusError::AddressInUse(address));
        }
        let role = handler.role();
        if role.is_singleton() {
            if let Some(holder) = self.address_of(role) {
                return Err(BusError::RoleTaken {
                    role,
                    address: holder,
                });
            }
        }
        self.entries.insert(
            address,
            Entry {
                handler,
                online: false,
            },
        );
        Ok(())
    }

    /// Remove a handler; absent addresses are ignored.
    pub fn remove(&mut self, address: u8) -> Option<Arc<dyn DeviceHandler>> {
        self.entries.remove(&address).map(|entry| entry.handler)
    }

    /// Handler for `address`.
    pub fn get(&self, address: u8) -> Option<Arc<dyn DeviceHandler>> {
        self.entries
            .get(&address)
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// Handler for `address`, marking it online.
    pub fn touch(&mut self, address: u8) -> Option<Arc<dyn DeviceHandler>> {
        self.entries.get_mut(&address).map(|entry| {
            entry.online = true;
            Arc::clone(&entry.handler)
        })
    }

    /// Mark every entry offline.
    pub fn set_all_offline(&mut self) {
        for entry in self.entries.values_mut() {
            entry.online = false;
        }
    }

    /// Whether the entry at `address` has produced traffic since the last disconnect.
    pub fn is_address_online(&self, address: u8) -> bool {
        self.entries.get(&address).is_some_and(|entry| entry.online)
    }

    /// Whether any device of `role` is online.
    pub fn is_online(&self, role: DeviceRole) -> bool {
        self.entries
            .values()
            .any(|entry| entry.online && entry.handler.role() == role)
    }

    /// Online handlers of `role`.
    pub fn online(&self, role: DeviceRole) -> Vec<Arc<dyn DeviceHandler>> {
        self.entries
            .values()
            .filter(|entry| entry.online && entry.handler.role() == role)
            .map(|entry| Arc::clone(&entry.handler))
            .collect()
    }

    /// Address of the first registered device of `role`.
    pub fn address_of(&self, role: DeviceRole) -> Option<u8> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.handler.role() == role)
            .map(|(address, _)| *address)
    }

    /// Registered addresses in ascending order.
    pub fn addresses(&self) -> Vec<u8> {
        self.entries.keys().copied().collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
