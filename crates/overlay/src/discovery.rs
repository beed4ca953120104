//! Per-contact service tables and the diff that drives add/remove
//! notifications.
//!
//! An update replaces a contact's whole table with the set parsed from
//! the newest capability document. Ids joining the set are added, ids
//! leaving it are removed, and an id present on both sides is silently
//! replaced even when its attributes changed. The diff itself is a
//! pure function so the engine is testable without a transport.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use yts_domain::ServiceDescriptor;

/// One table: service id → descriptor.
pub type ServiceTable = BTreeMap<String, ServiceDescriptor>;

/// Everything currently discovered: contact → service id → descriptor.
pub type ServiceSnapshot = BTreeMap<String, ServiceTable>;

/// The transitions one update produced, in id order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ServiceDiff {
    pub added: Vec<(String, ServiceDescriptor)>,
    pub removed: Vec<String>,
}

impl ServiceDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Pure set diff between two tables, keyed by service id only.
pub fn diff_services(old: &ServiceTable, new: &ServiceTable) -> ServiceDiff {
    let added = new
        .iter()
        .filter(|(id, _)| !old.contains_key(*id))
        .map(|(id, svc)| (id.clone(), svc.clone()))
        .collect();
    let removed = old
        .keys()
        .filter(|id| !new.contains_key(*id))
        .cloned()
        .collect();
    ServiceDiff { added, removed }
}

/// Thread-safe store of every contact's current service table.
pub struct DiscoveryStore {
    tables: RwLock<HashMap<String, ServiceTable>>,
}

impl Default for DiscoveryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Replace `contact`'s table with `new` and return the transitions.
    /// An empty `new` deletes the row.
    pub fn apply(&self, contact: &str, new: ServiceTable) -> ServiceDiff {
        let mut tables = self.tables.write();
        let old = tables.get(contact).cloned().unwrap_or_default();
        let diff = diff_services(&old, &new);
        if new.is_empty() {
            tables.remove(contact);
        } else {
            tables.insert(contact.to_owned(), new);
        }
        diff
    }

    /// Drop a contact's row entirely (presence loss). Equivalent to
    /// applying the empty table.
    pub fn remove_contact(&self, contact: &str) -> ServiceDiff {
        self.apply(contact, ServiceTable::new())
    }

    pub fn services_for(&self, contact: &str) -> Option<ServiceTable> {
        self.tables.read().get(contact).cloned()
    }

    pub fn snapshot(&self) -> ServiceSnapshot {
        self.tables
            .read()
            .iter()
            .map(|(contact, table)| (contact.clone(), table.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.tables.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(urn: &str) -> ServiceDescriptor {
        ServiceDescriptor::new("application").with_capability(urn)
    }

    fn table(ids: &[&str]) -> ServiceTable {
        ids.iter()
            .map(|id| (id.to_string(), svc("urn:example:cap")))
            .collect()
    }

    #[test]
    fn diff_finds_added_and_removed() {
        let old = table(&["org.gnome.Banshee", "org.gnome.Evince"]);
        let new = table(&["org.gnome.Evince", "org.gnome.Totem"]);
        let diff = diff_services(&old, &new);
        assert_eq!(
            diff.added.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
            vec!["org.gnome.Totem"]
        );
        assert_eq!(diff.removed, vec!["org.gnome.Banshee".to_owned()]);
    }

    #[test]
    fn attribute_change_is_silent() {
        let mut old = ServiceTable::new();
        old.insert("a.b".into(), svc("urn:one"));
        let mut new = ServiceTable::new();
        new.insert("a.b".into(), svc("urn:two"));
        assert!(diff_services(&old, &new).is_empty());
    }

    #[test]
    fn apply_replaces_the_whole_row() {
        let store = DiscoveryStore::new();
        let d1 = store.apply("alice@x", table(&["org.gnome.Banshee", "org.gnome.Evince"]));
        assert_eq!(d1.added.len(), 2);
        assert!(d1.removed.is_empty());

        let d2 = store.apply("alice@x", table(&["org.gnome.Evince"]));
        assert!(d2.added.is_empty());
        assert_eq!(d2.removed, vec!["org.gnome.Banshee".to_owned()]);

        let services = store.services_for("alice@x").unwrap();
        assert_eq!(services.len(), 1);
        assert!(services.contains_key("org.gnome.Evince"));
    }

    #[test]
    fn idempotent_reapply_is_a_noop() {
        let store = DiscoveryStore::new();
        store.apply("alice@x", table(&["a.b"]));
        let diff = store.apply("alice@x", table(&["a.b"]));
        assert!(diff.is_empty());
    }

    #[test]
    fn empty_update_deletes_the_row() {
        let store = DiscoveryStore::new();
        store.apply("alice@x", table(&["a.b", "c.d"]));
        let diff = store.remove_contact("alice@x");
        assert_eq!(diff.removed.len(), 2);
        assert!(store.services_for("alice@x").is_none());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn contacts_do_not_interfere() {
        let store = DiscoveryStore::new();
        store.apply("alice@x", table(&["a.b"]));
        store.apply("bob@x", table(&["c.d"]));
        store.remove_contact("alice@x");
        assert!(store.services_for("bob@x").is_some());
    }
}
