//! # Genericable Repository
//!
//! All genericables known to a broker, published as one immutable snapshot.
//!
//! ## Invariants
//! - Readers load a snapshot and never block.
//! - Writers are serialized by `write_lock`, rebuild the affected
//!   genericable through its builder and publish a fresh snapshot. A call
//!   that already holds a snapshot finishes against it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use arc_swap::ArcSwap;
use tracing::info;

use crate::error::Error;
use crate::error::Result;
use crate::genericable::Fitable;
use crate::genericable::FitableBuilder;
use crate::genericable::Genericable;
use crate::genericable::GenericableBuilder;
use crate::identity::ImplId;
use crate::identity::ServiceId;

pub type Snapshot = Arc<HashMap<ServiceId, Arc<Genericable>>>;

#[derive(Default)]
pub struct Repository {
    genericables: ArcSwap<HashMap<ServiceId, Arc<Genericable>>>,
    write_lock: Mutex<()>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.genericables.load_full()
    }

    /// Registers a genericable, merging it into any genericable already
    /// known under the same id.
    pub fn register(&self, builder: GenericableBuilder) -> Result<Arc<Genericable>> {
        self.update(builder.id().clone(), |existing| {
            let merged = match existing {
                Some(current) => current.to_builder().merge(builder),
                None => builder,
            };
            merged.build().map(Some)
        })?
        .ok_or_else(|| Error::Internal("registration produced no genericable".into()))
    }

    /// Makes sure `impl_id` exists, adding a bare fitable if needed.
    pub fn ensure_fitable(&self, impl_id: &ImplId) -> Result<Arc<Fitable>> {
        if let Some(fitable) = self.fitable(impl_id) {
            return Ok(fitable);
        }

        let genericable = self
            .update(impl_id.service().clone(), |existing| {
                let builder = existing
                    .map(|g| g.to_builder())
                    .unwrap_or_else(|| GenericableBuilder::new(impl_id.service().clone()));
                if builder.contains(impl_id.id(), impl_id.version()) {
                    return Ok(existing.cloned());
                }
                builder
                    .fitable(FitableBuilder::new(impl_id.id(), impl_id.version()).implicit())
                    .build()
                    .map(Some)
            })?
            .ok_or_else(|| Error::Internal(format!("{} vanished while being added", impl_id)))?;

        genericable
            .fitable_by_id(impl_id)
            .ok_or_else(|| Error::not_found(impl_id.to_string()))
    }

    /// Removes one fitable. A genericable left without fitables is dropped.
    pub fn remove_fitable(&self, impl_id: &ImplId) -> Result<()> {
        let mut found = false;
        self.update(impl_id.service().clone(), |existing| {
            let Some(current) = existing else {
                return Ok(None);
            };
            if current.fitable_by_id(impl_id).is_none() {
                return Ok(Some(Arc::clone(current)));
            }
            found = true;
            let remaining = current.to_builder().without(impl_id.id(), impl_id.version());
            if remaining.is_empty() {
                return Ok(None);
            }
            remaining.build().map(Some)
        })?;

        if !found {
            return Err(Error::not_found(impl_id.to_string()));
        }
        info!(fitable = %impl_id, "fitable removed");
        Ok(())
    }

    pub fn get(&self, service: &ServiceId) -> Result<Arc<Genericable>> {
        self.find(service)
            .ok_or_else(|| Error::not_found(format!("genericable {}", service)))
    }

    pub fn find(&self, service: &ServiceId) -> Option<Arc<Genericable>> {
        self.genericables.load().get(service).cloned()
    }

    pub fn fitable(&self, impl_id: &ImplId) -> Option<Arc<Fitable>> {
        self.find(impl_id.service())?.fitable_by_id(impl_id)
    }

    pub fn services(&self) -> Vec<ServiceId> {
        let mut services: Vec<ServiceId> = self.genericables.load().keys().cloned().collect();
        services.sort();
        services
    }

    /// Replaces the entry for `service` with whatever `f` returns
    /// (`None` removes it) and publishes the new snapshot.
    fn update<F>(&self, service: ServiceId, f: F) -> Result<Option<Arc<Genericable>>>
    where
        F: FnOnce(Option<&Arc<Genericable>>) -> Result<Option<Arc<Genericable>>>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Internal("repository writer poisoned".into()))?;

        let current = self.genericables.load_full();
        let replacement = f(current.get(&service))?;

        let mut next = HashMap::clone(&current);
        match &replacement {
            Some(genericable) => {
                next.insert(service, Arc::clone(genericable));
            }
            None => {
                next.remove(&service);
            }
        }
        self.genericables.store(Arc::new(next));
        Ok(replacement)
    }
}
