//! Pending-iq tracker. Every suspended operation (channel request,
//! capability query, status publish) parks a oneshot here keyed by its
//! iq id; the connection event loop routes the correlated result or
//! error iq back to the waiter.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use yts_domain::{ChannelConfig, Error, Result};
use yts_protocol::Element;

struct PendingIq {
    contact: String,
    tx: oneshot::Sender<Element>,
}

/// Map of iq id → pending oneshot sender + addressed contact.
pub struct IqCorrelator {
    pending: Mutex<HashMap<String, PendingIq>>,
    /// Maximum pending iqs per contact (0 = unlimited).
    max_pending_per_contact: usize,
    /// Maximum pending iqs globally (0 = unlimited).
    max_pending_global: usize,
}

impl IqCorrelator {
    pub fn new(channels: &ChannelConfig) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            max_pending_per_contact: channels.max_pending_per_contact,
            max_pending_global: channels.max_pending_global,
        }
    }

    /// Park a waiter for `id`. Ids are unique for the lifetime of the
    /// outstanding request; re-registering a live id is a caller error.
    pub fn register(&self, id: &str, contact: &str) -> Result<oneshot::Receiver<Element>> {
        let mut pending = self.pending.lock();

        if self.max_pending_global > 0 && pending.len() >= self.max_pending_global {
            return Err(Error::Validation(format!(
                "global pending limit reached ({} iqs in-flight)",
                pending.len()
            )));
        }
        if self.max_pending_per_contact > 0 {
            let count = pending.values().filter(|p| p.contact == contact).count();
            if count >= self.max_pending_per_contact {
                return Err(Error::Validation(format!(
                    "per-contact pending limit reached ({count} iqs in-flight for {contact})"
                )));
            }
        }
        if pending.contains_key(id) {
            return Err(Error::Protocol(format!(
                "correlation id {id} already in flight"
            )));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(
            id.to_owned(),
            PendingIq {
                contact: contact.to_owned(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Drop a waiter without completing it (timeout cleanup).
    pub fn forget(&self, id: &str) {
        self.pending.lock().remove(id);
    }

    /// Route a response iq to its waiter. Returns false when nothing
    /// was waiting on that id.
    pub fn complete(&self, id: &str, iq: Element) -> bool {
        if let Some(pending) = self.pending.lock().remove(id) {
            let _ = pending.tx.send(iq);
            true
        } else {
            tracing::warn!(id, "response iq for unknown correlation id");
            false
        }
    }

    /// Drop every waiter addressed at `contact` (contact went away).
    /// Waiters observe the closed channel. Returns how many were
    /// dropped.
    pub fn fail_for_contact(&self, contact: &str) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, p| p.contact != contact);
        let dropped = before - pending.len();
        if dropped > 0 {
            tracing::warn!(contact, dropped, "dropped in-flight iqs for lost contact");
        }
        dropped
    }

    /// Drop every waiter (our own stream closed).
    pub fn fail_all(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
