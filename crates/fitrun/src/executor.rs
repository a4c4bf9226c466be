//! # Local Executor Registry
//!
//! Binds fitables to in-process callables so same-process calls skip
//! serialization and the network entirely.
//!
//! ## Philosophy
//!
//! - **Snapshot Reads**: The table is an `ArcSwap` snapshot; lookups never
//!   block, even while executors are being added or removed.
//! - **Leases**: Every call holds an `ExecutorLease` for its whole duration.
//!   Unregistering marks the executor inactive, waits for outstanding leases
//!   to drain, and only then removes it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::Notify;
use tracing::debug;
use tracing::info;

use crate::context::CallContext;
use crate::error::Error;
use crate::error::Result;
use crate::identity::ImplId;
use crate::metadata::Aliases;
use fitrpc::Value;

pub type Callable = Arc<dyn Fn(CallContext, Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// An in-process binding of a fitable to a directly callable function.
#[derive(Clone)]
pub struct LocalExecutor {
    impl_id: ImplId,
    aliases: Aliases,
    callable: Callable,
    micro: bool,
}

impl LocalExecutor {
    pub fn new<F, Fut>(impl_id: ImplId, f: F) -> Self
    where
        F: Fn(CallContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            impl_id,
            aliases: Aliases::default(),
            callable: Arc::new(move |ctx, args| f(ctx, args).boxed()),
            micro: false,
        }
    }

    pub fn with_aliases(mut self, aliases: Aliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Marks the executor as served to remote callers, so the hosting
    /// broker announces it with its own target.
    pub fn micro(mut self, micro: bool) -> Self {
        self.micro = micro;
        self
    }

    pub fn impl_id(&self) -> &ImplId {
        &self.impl_id
    }

    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    pub fn is_micro(&self) -> bool {
        self.micro
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("impl_id", &self.impl_id)
            .field("aliases", &self.aliases)
            .field("micro", &self.micro)
            .finish()
    }
}

struct Slot {
    executor: LocalExecutor,
    active: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

/// Proof that a call is running against an executor.
///
/// While any lease is alive, `ExecutorRegistry::unregister` waits.
pub struct ExecutorLease {
    slot: Arc<Slot>,
}

impl ExecutorLease {
    pub fn executor(&self) -> &LocalExecutor {
        &self.slot.executor
    }

    pub async fn invoke(self, ctx: CallContext, args: Vec<Value>) -> Result<Value> {
        (self.slot.executor.callable)(ctx, args).await
    }
}

impl Drop for ExecutorLease {
    fn drop(&mut self) {
        if self.slot.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.slot.drained.notify_one();
        }
    }
}

#[derive(Default)]
pub struct ExecutorRegistry {
    slots: ArcSwap<HashMap<ImplId, Arc<Slot>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, executor: LocalExecutor) -> Result<()> {
        let impl_id = executor.impl_id().clone();
        if self.slots.load().contains_key(&impl_id) {
            return Err(Error::DuplicateExecutor(impl_id));
        }

        let slot = Arc::new(Slot {
            executor,
            active: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        });

        let mut duplicate = false;
        self.slots.rcu(|current| {
            duplicate = current.contains_key(&impl_id);
            let mut next = HashMap::clone(current);
            if !duplicate {
                next.insert(impl_id.clone(), Arc::clone(&slot));
            }
            next
        });

        if duplicate {
            return Err(Error::DuplicateExecutor(impl_id));
        }

        info!(fitable = %impl_id, "local executor registered");
        Ok(())
    }

    /// Takes a lease on the active executor for `impl_id`, if any.
    pub fn acquire(&self, impl_id: &ImplId) -> Option<ExecutorLease> {
        let slot = Arc::clone(self.slots.load().get(impl_id)?);

        // Count first, then check: either we observe the deactivation or
        // the draining side observes our lease.
        slot.in_flight.fetch_add(1, Ordering::SeqCst);
        let lease = ExecutorLease { slot };
        if !lease.slot.active.load(Ordering::SeqCst) {
            return None;
        }
        Some(lease)
    }

    pub fn contains(&self, impl_id: &ImplId) -> bool {
        self.slots
            .load()
            .get(impl_id)
            .is_some_and(|slot| slot.active.load(Ordering::SeqCst))
    }

    /// Whether `impl_id` is still registered but no longer accepts calls.
    pub fn is_draining(&self, impl_id: &ImplId) -> bool {
        self.slots
            .load()
            .get(impl_id)
            .is_some_and(|slot| !slot.active.load(Ordering::SeqCst))
    }

    /// Executors currently accepting calls.
    pub fn executors(&self) -> Vec<LocalExecutor> {
        self.slots
            .load()
            .values()
            .filter(|slot| slot.active.load(Ordering::SeqCst))
            .map(|slot| slot.executor.clone())
            .collect()
    }

    /// Calls currently holding a lease on `impl_id`.
    pub fn in_flight(&self, impl_id: &ImplId) -> usize {
        self.slots
            .load()
            .get(impl_id)
            .map_or(0, |slot| slot.in_flight.load(Ordering::SeqCst))
    }

    /// Marks the executor inactive, drains in-flight calls, then removes it.
    ///
    /// Returns `false` if no active executor was registered for `impl_id`.
    pub async fn unregister(&self, impl_id: &ImplId) -> bool {
        let Some(slot) = self.slots.load().get(impl_id).cloned() else {
            return false;
        };

        if !slot.active.swap(false, Ordering::SeqCst) {
            // Another unregister is already draining this executor.
            return false;
        }

        debug!(fitable = %impl_id, in_flight = slot.in_flight.load(Ordering::SeqCst), "draining local executor");
        while slot.in_flight.load(Ordering::SeqCst) != 0 {
            slot.drained.notified().await;
        }

        self.slots.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(impl_id);
            next
        });

        info!(fitable = %impl_id, "local executor removed");
        true
    }
}
