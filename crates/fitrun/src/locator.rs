//! # Target Location
//!
//! Answers "where can this fitable run right now?".
//!
//! Two sources are merged: the static targets declared on the fitable and
//! the live `WorkerDirectory`, where workers announce the fitables they
//! serve. Only targets in the locator's environment are ever returned.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;
use tracing::info;

use crate::genericable::Fitable;
use crate::identity::ImplId;
use crate::target::Target;

#[derive(Debug, Clone)]
pub struct Worker {
    pub target: Target,
    pub fitables: BTreeSet<ImplId>,
}

/// Read-mostly table of known workers, keyed by worker id.
#[derive(Default)]
pub struct WorkerDirectory {
    workers: ArcSwap<HashMap<String, Arc<Worker>>>,
}

impl WorkerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) what `target` serves.
    pub fn announce(&self, target: Target, fitables: impl IntoIterator<Item = ImplId>) {
        let worker = Arc::new(Worker {
            target,
            fitables: fitables.into_iter().collect(),
        });
        let worker_id = worker.target.worker_id.clone();
        let count = worker.fitables.len();

        self.workers.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(worker_id.clone(), Arc::clone(&worker));
            next
        });
        info!(worker = %worker_id, fitables = count, "worker announced");
    }

    pub fn withdraw(&self, worker_id: &str) -> bool {
        let mut removed = false;
        self.workers.rcu(|current| {
            let mut next = HashMap::clone(current);
            removed = next.remove(worker_id).is_some();
            next
        });
        if removed {
            info!(worker = %worker_id, "worker withdrawn");
        }
        removed
    }

    /// Targets of every worker serving `impl_id`, ordered by worker id.
    pub fn targets_for(&self, impl_id: &ImplId) -> Vec<Target> {
        let workers = self.workers.load();
        let mut targets: Vec<Target> = workers
            .values()
            .filter(|w| w.fitables.contains(impl_id))
            .map(|w| w.target.clone())
            .collect();
        targets.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        targets
    }

    pub fn worker(&self, worker_id: &str) -> Option<Arc<Worker>> {
        self.workers.load().get(worker_id).cloned()
    }

    pub fn workers(&self) -> Vec<Arc<Worker>> {
        self.workers.load().values().cloned().collect()
    }
}

pub struct TargetLocator {
    environment: String,
    directory: Arc<WorkerDirectory>,
}

impl TargetLocator {
    pub fn new(environment: impl Into<String>, directory: Arc<WorkerDirectory>) -> Self {
        Self {
            environment: environment.into(),
            directory,
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Static targets first, then announced ones; one entry per worker.
    /// An empty result means nothing in this environment serves the fitable.
    pub fn locate(&self, fitable: &Fitable) -> Vec<Target> {
        let mut seen = HashSet::new();
        let located: Vec<Target> = fitable
            .targets()
            .iter()
            .cloned()
            .chain(self.directory.targets_for(fitable.id()))
            .filter(|t| t.environment == self.environment)
            .filter(|t| seen.insert(t.worker_id.clone()))
            .collect();

        debug!(fitable = %fitable.id(), targets = located.len(), "located targets");
        located
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genericable::FitableBuilder;
    use crate::genericable::GenericableBuilder;
    use crate::identity::ServiceId;

    fn service() -> ServiceId {
        ServiceId::new("pay.charge", "1.0.0").unwrap()
    }

    #[test]
    fn test_union_dedup_and_environment_filter() {
        let genericable = GenericableBuilder::new(service())
            .fitable(
                FitableBuilder::new("card", "1")
                    .target(Target::new("w1", "static-host", "prod"))
                    .target(Target::new("w9", "h", "dev")),
            )
            .build()
            .unwrap();
        let fitable = genericable.fitable("card", "1").unwrap();

        let directory = Arc::new(WorkerDirectory::new());
        directory.announce(Target::new("w1", "announced-host", "prod"), [fitable.id().clone()]);
        directory.announce(Target::new("w2", "h2", "prod"), [fitable.id().clone()]);
        directory.announce(Target::new("w3", "h3", "dev"), [fitable.id().clone()]);

        let located = TargetLocator::new("prod", Arc::clone(&directory)).locate(&fitable);
        let workers: Vec<&str> = located.iter().map(|t| t.worker_id.as_str()).collect();
        assert_eq!(workers, vec!["w1", "w2"]);
        assert_eq!(located[0].host, "static-host");

        assert!(TargetLocator::new("staging", directory).locate(&fitable).is_empty());
    }

    #[test]
    fn test_withdraw() {
        let id = ImplId::new(service(), "card", "1").unwrap();
        let directory = WorkerDirectory::new();
        directory.announce(Target::new("w1", "h", "prod"), [id.clone()]);
        assert_eq!(directory.targets_for(&id).len(), 1);
        assert!(directory.withdraw("w1"));
        assert!(!directory.withdraw("w1"));
        assert!(directory.targets_for(&id).is_empty());
    }
}
