//! Aggregate of every status advertised around us, nested
//! contact → capability → service → value.
//!
//! An empty value is real data: it records "explicitly cleared" and
//! stays visible while any sibling under the same capability still has
//! a value. Only once every entry under a capability is empty does the
//! capability key go away, and a contact row goes away with its last
//! capability.

use std::collections::BTreeMap;

use parking_lot::RwLock;

/// contact → capability URN → service name → status value.
pub type StatusSnapshot = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// One applied update, as observers see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub contact: String,
    pub capability: String,
    pub service: String,
    pub status: String,
}

pub struct StatusStore {
    entries: RwLock<StatusSnapshot>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(StatusSnapshot::new()),
        }
    }

    /// Record the newest value for (contact, capability, service) and
    /// prune per the empty-string rule. Always yields exactly one
    /// change for observers.
    pub fn apply(
        &self,
        contact: &str,
        capability: &str,
        service: &str,
        status: &str,
    ) -> StatusChange {
        let mut entries = self.entries.write();
        let row = entries.entry(contact.to_owned()).or_default();
        let caps = row.entry(capability.to_owned()).or_default();
        caps.insert(service.to_owned(), status.to_owned());

        if status.is_empty() && caps.values().all(String::is_empty) {
            row.remove(capability);
        }
        if row.is_empty() {
            entries.remove(contact);
        }

        StatusChange {
            contact: contact.to_owned(),
            capability: capability.to_owned(),
            service: service.to_owned(),
            status: status.to_owned(),
        }
    }

    /// Clear every service the contact currently has under a
    /// capability (a retraction names no service). One change per
    /// cleared entry.
    pub fn clear_capability(&self, contact: &str, capability: &str) -> Vec<StatusChange> {
        let services: Vec<String> = {
            let entries = self.entries.read();
            entries
                .get(contact)
                .and_then(|row| row.get(capability))
                .map(|caps| caps.keys().cloned().collect())
                .unwrap_or_default()
        };
        services
            .into_iter()
            .map(|service| self.apply(contact, capability, &service, ""))
            .collect()
    }

    /// Silently drop a contact's whole row (presence loss). Statuses
    /// are advertisements; a gone contact has none.
    pub fn remove_contact(&self, contact: &str) {
        self.entries.write().remove(contact);
    }

    pub fn statuses_for(&self, contact: &str) -> Option<BTreeMap<String, BTreeMap<String, String>>> {
        self.entries.read().get(contact).cloned()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.entries.read().clone()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
