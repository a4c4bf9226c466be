//! # Dynamic Router
//!
//! Runtime overrides choosing which fitable serves a genericable, without
//! touching the genericable's declared default.
//!
//! The table is published as an immutable snapshot. A call reads the
//! snapshot once; a concurrent `set_route` affects later calls only.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwap;
use tracing::info;

use crate::identity::ImplId;
use crate::identity::ServiceId;

pub type RouteTable = HashMap<ServiceId, ImplId>;

#[derive(Default)]
pub struct DynamicRouter {
    routes: ArcSwap<RouteTable>,
    revision: AtomicU64,
}

impl DynamicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes every call to `fitable`'s genericable to `fitable`.
    /// Returns the override it replaced, if any.
    pub fn set_route(&self, fitable: ImplId) -> Option<ImplId> {
        let service = fitable.service().clone();
        let mut previous = None;
        self.routes.rcu(|current| {
            let mut next = RouteTable::clone(current);
            previous = next.insert(service.clone(), fitable.clone());
            next
        });
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        info!(service = %service, fitable = %fitable, revision, "route override set");
        previous
    }

    pub fn clear_route(&self, service: &ServiceId) -> Option<ImplId> {
        let mut previous = None;
        self.routes.rcu(|current| {
            let mut next = RouteTable::clone(current);
            previous = next.remove(service);
            next
        });
        if previous.is_some() {
            let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
            info!(service = %service, revision, "route override cleared");
        }
        previous
    }

    pub fn route(&self, service: &ServiceId) -> Option<ImplId> {
        self.routes.load().get(service).cloned()
    }

    /// Incremented on every effective change.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitable(id: &str) -> ImplId {
        ImplId::parts("pay.charge", "1.0.0", id, "1").unwrap()
    }

    #[test]
    fn test_set_and_clear() {
        let router = DynamicRouter::new();
        let service = fitable("a").service().clone();

        assert_eq!(router.route(&service), None);
        assert_eq!(router.set_route(fitable("a")), None);
        assert_eq!(router.set_route(fitable("b")), Some(fitable("a")));
        assert_eq!(router.route(&service), Some(fitable("b")));
        assert_eq!(router.revision(), 2);

        assert_eq!(router.clear_route(&service), Some(fitable("b")));
        assert_eq!(router.clear_route(&service), None);
        assert_eq!(router.revision(), 3);
    }

    #[test]
    fn test_snapshot_is_stable() {
        let router = DynamicRouter::new();
        router.set_route(fitable("a"));
        let snapshot = router.routes();
        router.set_route(fitable("b"));

        assert_eq!(snapshot.get(fitable("a").service()), Some(&fitable("a")));
        assert_eq!(router.routes().get(fitable("a").service()), Some(&fitable("b")));
    }
}
