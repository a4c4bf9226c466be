//! # Genericables and Fitables
//!
//! A `Genericable` is a service contract at a version; each `Fitable` is one
//! implementation of it. A genericable owns its fitables, and every fitable
//! keeps a weak pointer back to its genericable so degradation can find its
//! siblings.
//!
//! ## Invariants
//! - At most one fitable per `(id, version)` within a genericable.
//! - A degradation pointer names another fitable of the same genericable.
//! - The declared default, if any, names one of the fitables.
//! - Once built, a genericable never changes. Edits go through
//!   `to_builder` and publish a new value.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Weak;

use tracing::debug;
use tracing::warn;

use crate::broker::Broker;
use crate::context::CallContext;
use crate::context::Route;
use crate::error::Error;
use crate::error::Result;
use crate::identity::ImplId;
use crate::identity::ServiceId;
use crate::metadata::Aliases;
use crate::metadata::Tags;
use crate::router::DynamicRouter;
use crate::target::Target;
use fitrpc::Value;

#[derive(Debug, Clone)]
pub struct FitableBuilder {
    id: String,
    version: String,
    aliases: Aliases,
    tags: Tags,
    degradation: Option<(String, String)>,
    targets: Vec<Target>,
    implicit: bool,
}

impl FitableBuilder {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            aliases: Aliases::default(),
            tags: Tags::default(),
            degradation: None,
            targets: Vec::new(),
            implicit: false,
        }
    }

    pub fn aliases(mut self, aliases: Aliases) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Falls back to the sibling fitable `(id, version)` when this one is unreachable.
    pub fn degradation(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.degradation = Some((id.into(), version.into()));
        self
    }

    /// A statically known target, in addition to announced ones.
    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Marks a fitable created on demand by an executor or announcement. A
    /// later declaration of the same fitable replaces it.
    pub(crate) fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }

    fn matches(&self, id: &str, version: &str) -> bool {
        self.id == id && self.version == version
    }
}

pub struct Fitable {
    id: ImplId,
    aliases: Aliases,
    tags: Tags,
    degradation: Option<ImplId>,
    targets: Vec<Target>,
    implicit: bool,
    genericable: Weak<Genericable>,
}

impl Fitable {
    pub fn id(&self) -> &ImplId {
        &self.id
    }

    pub fn aliases(&self) -> &Aliases {
        &self.aliases
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn degradation(&self) -> Option<&ImplId> {
        self.degradation.as_ref()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// The owning genericable, unless it has since been dropped.
    pub fn genericable(&self) -> Option<Arc<Genericable>> {
        self.genericable.upgrade()
    }

    pub fn to_builder(&self) -> FitableBuilder {
        FitableBuilder {
            id: self.id.id().to_string(),
            version: self.id.version().to_string(),
            aliases: self.aliases.clone(),
            tags: self.tags.clone(),
            degradation: self
                .degradation
                .as_ref()
                .map(|d| (d.id().to_string(), d.version().to_string())),
            targets: self.targets.clone(),
            implicit: self.implicit,
        }
    }

    /// Runs the call here, following degradation pointers on transport
    /// failures up to the broker's hop limit.
    pub async fn execute(self: &Arc<Self>, broker: &Broker, ctx: &CallContext, args: Vec<Value>) -> Result<Value> {
        let max_hops = broker.config().degradation_hops;
        let mut current = Arc::clone(self);
        let mut hops = 0;

        loop {
            let error = match current.execute_once(broker, ctx, &args).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_transport() || hops >= max_hops {
                return Err(error);
            }

            let Some(next) = current.degraded() else {
                return Err(error);
            };

            hops += 1;
            warn!(
                fitable = %current.id,
                degradation = %next.id,
                hops,
                error = %error,
                "fitable unreachable, degrading"
            );
            current = next;
        }
    }

    fn degraded(&self) -> Option<Arc<Fitable>> {
        let target = self.degradation.as_ref()?;
        self.genericable()?.fitable_by_id(target)
    }

    async fn execute_once(&self, broker: &Broker, ctx: &CallContext, args: &[Value]) -> Result<Value> {
        if let Some(lease) = broker.executors().acquire(&self.id) {
            debug!(fitable = %self.id, "local executor");
            return lease.invoke(ctx.clone(), args.to_vec()).await;
        }

        let targets = broker.locator().locate(self);
        if targets.is_empty() {
            return Err(Error::unreachable(&self.id, "no local executor and no target in this environment"));
        }

        broker.balancer().invoke(self, targets, ctx, args).await
    }
}

impl std::fmt::Debug for Fitable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fitable")
            .field("id", &self.id)
            .field("aliases", &self.aliases)
            .field("tags", &self.tags)
            .field("degradation", &self.degradation)
            .field("targets", &self.targets)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GenericableBuilder {
    id: ServiceId,
    fitables: Vec<FitableBuilder>,
    default: Option<(String, String)>,
}

impl GenericableBuilder {
    pub fn new(id: ServiceId) -> Self {
        Self {
            id,
            fitables: Vec::new(),
            default: None,
        }
    }

    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    pub fn fitable(mut self, fitable: FitableBuilder) -> Self {
        self.fitables.push(fitable);
        self
    }

    pub fn default_fitable(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.default = Some((id.into(), version.into()));
        self
    }

    pub fn contains(&self, id: &str, version: &str) -> bool {
        self.fitables.iter().any(|f| f.matches(id, version))
    }

    /// Appends `other`'s fitables, replacing implicit ones of the same id;
    /// `other`'s default wins when it has one.
    pub fn merge(mut self, other: GenericableBuilder) -> Self {
        for fitable in other.fitables {
            let implicit = self
                .fitables
                .iter()
                .position(|f| f.implicit && f.matches(&fitable.id, &fitable.version));
            match implicit {
                Some(index) => self.fitables[index] = fitable,
                None => self.fitables.push(fitable),
            }
        }
        if other.default.is_some() {
            self.default = other.default;
        }
        self
    }

    /// Drops the fitable `(id, version)` along with any default or
    /// degradation pointer naming it.
    pub fn without(mut self, id: &str, version: &str) -> Self {
        self.fitables.retain(|f| !f.matches(id, version));
        for fitable in &mut self.fitables {
            if fitable
                .degradation
                .as_ref()
                .is_some_and(|(d_id, d_version)| d_id == id && d_version == version)
            {
                fitable.degradation = None;
            }
        }
        if self
            .default
            .as_ref()
            .is_some_and(|(d_id, d_version)| d_id == id && d_version == version)
        {
            self.default = None;
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fitables.is_empty()
    }

    /// Ids of the declared fitables, validated.
    pub fn impl_ids(&self) -> Result<Vec<ImplId>> {
        self.fitables
            .iter()
            .map(|f| Ok(ImplId::new(self.id.clone(), f.id.clone(), f.version.clone())?))
            .collect()
    }

    pub fn build(self) -> Result<Arc<Genericable>> {
        let mut seen = HashSet::new();
        let mut prepared = Vec::with_capacity(self.fitables.len());

        for fitable in &self.fitables {
            let id = ImplId::new(self.id.clone(), fitable.id.clone(), fitable.version.clone())?;
            if !seen.insert(id.clone()) {
                return Err(Error::DuplicateFitable(id));
            }
            prepared.push(id);
        }

        let mut degradations = Vec::with_capacity(self.fitables.len());
        for (fitable, id) in self.fitables.iter().zip(&prepared) {
            let degradation = match &fitable.degradation {
                None => None,
                Some((d_id, d_version)) => {
                    let target = ImplId::new(self.id.clone(), d_id.clone(), d_version.clone())?;
                    if &target == id || !seen.contains(&target) {
                        return Err(Error::InvalidDegradation {
                            fitable: id.clone(),
                            degradation: target.fitable_label(),
                        });
                    }
                    Some(target)
                }
            };
            degradations.push(degradation);
        }

        let default = match &self.default {
            None => None,
            Some((d_id, d_version)) => {
                let default = ImplId::new(self.id.clone(), d_id.clone(), d_version.clone())?;
                if !seen.contains(&default) {
                    return Err(Error::not_found(format!("default fitable {}", default)));
                }
                Some(default)
            }
        };

        let GenericableBuilder { id, fitables, .. } = self;
        Ok(Arc::new_cyclic(|weak| Genericable {
            id,
            fitables: fitables
                .into_iter()
                .zip(prepared)
                .zip(degradations)
                .map(|((builder, impl_id), degradation)| {
                    Arc::new(Fitable {
                        id: impl_id,
                        aliases: builder.aliases,
                        tags: builder.tags,
                        degradation,
                        targets: builder.targets,
                        implicit: builder.implicit,
                        genericable: weak.clone(),
                    })
                })
                .collect(),
            default,
        }))
    }
}

pub struct Genericable {
    id: ServiceId,
    fitables: Vec<Arc<Fitable>>,
    default: Option<ImplId>,
}

impl Genericable {
    pub fn id(&self) -> &ServiceId {
        &self.id
    }

    /// Fitables in declaration order.
    pub fn fitables(&self) -> &[Arc<Fitable>] {
        &self.fitables
    }

    pub fn default_fitable(&self) -> Option<&ImplId> {
        self.default.as_ref()
    }

    /// The fitable with exactly this id and version.
    pub fn fitable(&self, id: &str, version: &str) -> Result<Arc<Fitable>> {
        self.fitables
            .iter()
            .find(|f| f.id.id() == id && f.id.version() == version)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("fitable {}@{} of {}", id, version, self.id)))
    }

    pub fn fitable_by_id(&self, impl_id: &ImplId) -> Option<Arc<Fitable>> {
        self.fitables.iter().find(|f| &f.id == impl_id).cloned()
    }

    /// Resolves a pinned route. Without a version the implementation id
    /// must be unambiguous.
    pub fn resolve_pinned(&self, route: &Route) -> Result<Arc<Fitable>> {
        if let Some(version) = &route.version {
            return self.fitable(&route.impl_id, version);
        }

        let mut matches = self.fitables.iter().filter(|f| f.id.id() == route.impl_id);
        match (matches.next(), matches.next()) {
            (Some(only), None) => Ok(Arc::clone(only)),
            (None, _) => Err(Error::not_found(format!("fitable {} of {}", route.impl_id, self.id))),
            (Some(_), Some(_)) => Err(Error::not_found(format!(
                "fitable {} of {} exists in several versions, pin one",
                route.impl_id, self.id
            ))),
        }
    }

    /// Picks the fitable for a call: pinned route, then router override,
    /// then the declared default.
    pub fn resolve(&self, ctx: &CallContext, router: &DynamicRouter) -> Result<Arc<Fitable>> {
        if let Some(route) = ctx.route() {
            return self.resolve_pinned(route);
        }

        if let Some(routed) = router.route(&self.id) {
            return self
                .fitable_by_id(&routed)
                .ok_or_else(|| Error::not_found(format!("routed fitable {}", routed)));
        }

        match &self.default {
            Some(default) => self
                .fitable_by_id(default)
                .ok_or_else(|| Error::not_found(format!("default fitable {}", default))),
            None => Err(Error::no_route(&self.id)),
        }
    }

    pub async fn execute(&self, broker: &Broker, ctx: &CallContext, args: Vec<Value>) -> Result<Value> {
        let fitable = self.resolve(ctx, broker.router())?;
        debug!(service = %self.id, fitable = %fitable.id, "resolved fitable");
        fitable.execute(broker, ctx, args).await
    }

    pub fn to_builder(&self) -> GenericableBuilder {
        GenericableBuilder {
            id: self.id.clone(),
            fitables: self.fitables.iter().map(|f| f.to_builder()).collect(),
            default: self
                .default
                .as_ref()
                .map(|d| (d.id().to_string(), d.version().to_string())),
        }
    }
}

impl std::fmt::Debug for Genericable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Genericable")
            .field("id", &self.id)
            .field("fitables", &self.fitables)
            .field("default", &self.default)
            .finish()
    }
}
