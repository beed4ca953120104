//! Capability document cache with request coalescing.
//!
//! Documents are keyed by their ver hash and cached for the process
//! lifetime once resolved; hashes are content digests, so entries never
//! go stale. At most one disco query is in flight per ver: the first
//! caller to miss owns the query, later callers park a waiter and share
//! its outcome. Failures are delivered to waiters but never cached.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use yts_protocol::CapabilityDocument;

type Waiter = oneshot::Sender<Option<Arc<CapabilityDocument>>>;

/// What a caller holding a ver should do next.
pub enum Resolution {
    /// Already resolved; use this document.
    Cached(Arc<CapabilityDocument>),
    /// Nobody is resolving this ver: the caller now owns the query and
    /// must end it with [`CapsCache::fulfill`] or [`CapsCache::fail`].
    MustResolve,
    /// Someone else owns the query; await the shared outcome. `None`
    /// means the query failed.
    Pending(oneshot::Receiver<Option<Arc<CapabilityDocument>>>),
}

pub struct CapsCache {
    resolved: RwLock<HashMap<String, Arc<CapabilityDocument>>>,
    inflight: Mutex<HashMap<String, Vec<Waiter>>>,
}

impl Default for CapsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CapsCache {
    pub fn new() -> Self {
        Self {
            resolved: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Non-registering lookup.
    pub fn lookup(&self, ver: &str) -> Option<Arc<CapabilityDocument>> {
        self.resolved.read().get(ver).cloned()
    }

    /// Resolve-or-join for a ver hash.
    pub fn begin(&self, ver: &str) -> Resolution {
        if let Some(doc) = self.lookup(ver) {
            return Resolution::Cached(doc);
        }
        // lock order: inflight before the re-check, so a concurrent
        // fulfill cannot slip between the two.
        let mut inflight = self.inflight.lock();
        if let Some(doc) = self.resolved.read().get(ver).cloned() {
            return Resolution::Cached(doc);
        }
        match inflight.get_mut(ver) {
            Some(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Resolution::Pending(rx)
            }
            None => {
                inflight.insert(ver.to_owned(), Vec::new());
                Resolution::MustResolve
            }
        }
    }

    /// Record a resolved document and wake every waiter with it.
    pub fn fulfill(&self, ver: &str, doc: CapabilityDocument) -> Arc<CapabilityDocument> {
        let doc = Arc::new(doc);
        // same order as begin: inflight, then resolved
        let waiters = {
            let mut inflight = self.inflight.lock();
            self.resolved.write().insert(ver.to_owned(), doc.clone());
            inflight.remove(ver)
        };
        if let Some(waiters) = waiters {
            for waiter in waiters {
                let _ = waiter.send(Some(doc.clone()));
            }
        }
        doc
    }

    /// Report a failed query. Waiters are woken with `None`; the
    /// failure is not cached, so a retry may succeed later.
    pub fn fail(&self, ver: &str) {
        if let Some(waiters) = self.inflight.lock().remove(ver) {
            let dropped = waiters.len();
            for waiter in waiters {
                let _ = waiter.send(None);
            }
            tracing::debug!(ver, waiters = dropped, "capability resolution failed");
        }
    }

    pub fn len(&self) -> usize {
        self.resolved.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(ver: &str) -> CapabilityDocument {
        CapabilityDocument::empty(ver)
    }

    #[test]
    fn first_caller_owns_the_query() {
        let cache = CapsCache::new();
        assert!(matches!(cache.begin("v1"), Resolution::MustResolve));
        // second caller joins instead of querying again
        assert!(matches!(cache.begin("v1"), Resolution::Pending(_)));
    }

    #[tokio::test]
    async fn waiters_share_the_outcome() {
        let cache = CapsCache::new();
        assert!(matches!(cache.begin("v1"), Resolution::MustResolve));
        let Resolution::Pending(rx_a) = cache.begin("v1") else {
            panic!("expected pending");
        };
        let Resolution::Pending(rx_b) = cache.begin("v1") else {
            panic!("expected pending");
        };

        let fulfilled = cache.fulfill("v1", doc("v1"));
        let got_a = rx_a.await.unwrap().unwrap();
        let got_b = rx_b.await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&got_a, &fulfilled));
        assert!(Arc::ptr_eq(&got_b, &fulfilled));
    }

    #[test]
    fn fulfilled_ver_is_a_cache_hit() {
        let cache = CapsCache::new();
        assert!(matches!(cache.begin("v1"), Resolution::MustResolve));
        cache.fulfill("v1", doc("v1"));
        assert!(matches!(cache.begin("v1"), Resolution::Cached(_)));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn failure_is_not_cached() {
        let cache = CapsCache::new();
        assert!(matches!(cache.begin("v1"), Resolution::MustResolve));
        let Resolution::Pending(rx) = cache.begin("v1") else {
            panic!("expected pending");
        };

        cache.fail("v1");
        assert_eq!(rx.await.unwrap(), None);

        // a retry starts over instead of replaying the failure
        assert!(matches!(cache.begin("v1"), Resolution::MustResolve));
        assert!(cache.is_empty());
    }

    #[test]
    fn distinct_vers_resolve_independently() {
        let cache = CapsCache::new();
        assert!(matches!(cache.begin("v1"), Resolution::MustResolve));
        assert!(matches!(cache.begin("v2"), Resolution::MustResolve));
        cache.fulfill("v2", doc("v2"));
        assert!(matches!(cache.begin("v2"), Resolution::Cached(_)));
        assert!(matches!(cache.begin("v1"), Resolution::Pending(_)));
    }
}
