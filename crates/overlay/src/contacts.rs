//! In-memory registry of reachable contacts and their advertised caps.
//!
//! Contacts are keyed by bare jid; the full jid the presence came from
//! is kept as the address later iqs are sent to. Multi-resource
//! presence merging is out of scope, so a later resource simply
//! replaces the address.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use yts_protocol::CapsToken;

/// A reachable contact.
#[derive(Debug, Clone)]
pub struct ContactPresence {
    /// Bare jid, the registry key.
    pub jid: String,
    /// Full jid of the announcing resource; iqs are addressed here.
    pub address: String,
    /// The caps token from the most recent available presence, if any.
    pub caps: Option<CapsToken>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Strip the resource part of a jid.
pub fn bare_jid(jid: &str) -> &str {
    match jid.split_once('/') {
        Some((bare, _resource)) => bare,
        None => jid,
    }
}

/// Thread-safe registry of every contact currently online.
pub struct ContactRegistry {
    contacts: RwLock<HashMap<String, ContactPresence>>,
}

impl Default for ContactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContactRegistry {
    pub fn new() -> Self {
        Self {
            contacts: RwLock::new(HashMap::new()),
        }
    }

    /// Record an available presence. Returns `(is_new, caps_changed)`:
    /// `is_new` when the contact was not online before, `caps_changed`
    /// when the advertised token differs from the one on record.
    pub fn observe_available(
        &self,
        full_jid: &str,
        caps: Option<CapsToken>,
    ) -> (bool, bool) {
        let bare = bare_jid(full_jid).to_owned();
        let now = Utc::now();
        let mut contacts = self.contacts.write();
        match contacts.get_mut(&bare) {
            Some(existing) => {
                let changed = existing.caps != caps;
                existing.address = full_jid.to_owned();
                existing.caps = caps;
                existing.last_seen = now;
                (false, changed)
            }
            None => {
                tracing::info!(contact = %bare, "contact online");
                let changed = caps.is_some();
                contacts.insert(
                    bare.clone(),
                    ContactPresence {
                        jid: bare,
                        address: full_jid.to_owned(),
                        caps,
                        first_seen: now,
                        last_seen: now,
                    },
                );
                (true, changed)
            }
        }
    }

    /// Record an unavailable presence. Returns the removed entry, if
    /// the contact was known.
    pub fn observe_unavailable(&self, full_jid: &str) -> Option<ContactPresence> {
        let bare = bare_jid(full_jid);
        let removed = self.contacts.write().remove(bare);
        if removed.is_some() {
            tracing::info!(contact = %bare, "contact offline");
        }
        removed
    }

    pub fn is_online(&self, jid: &str) -> bool {
        self.contacts.read().contains_key(bare_jid(jid))
    }

    pub fn get(&self, jid: &str) -> Option<ContactPresence> {
        self.contacts.read().get(bare_jid(jid)).cloned()
    }

    /// Address to send iqs for this contact to.
    pub fn address_of(&self, jid: &str) -> Option<String> {
        self.contacts
            .read()
            .get(bare_jid(jid))
            .map(|c| c.address.clone())
    }

    pub fn list(&self) -> Vec<ContactPresence> {
        self.contacts.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.read().is_empty()
    }

    /// Forget everyone (our own stream closed).
    pub fn clear(&self) -> Vec<ContactPresence> {
        self.contacts.write().drain().map(|(_, c)| c).collect()
    }
}
