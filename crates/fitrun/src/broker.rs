//! # Broker
//!
//! Central registry of one process: which genericables and fitables exist,
//! which of them run here, where the others run, and how calls are routed
//! and balanced.
//!
//! Every table is readable without locks so any number of calls proceed
//! while registrations, route changes and announcements happen.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use fitrpc::Format;
use tracing::info;
use tracing::warn;

use crate::balancer::LoadBalancer;
use crate::config::BrokerConfig;
use crate::error::Error;
use crate::error::Result;
use crate::executor::ExecutorRegistry;
use crate::executor::LocalExecutor;
use crate::genericable::Genericable;
use crate::genericable::GenericableBuilder;
use crate::identity::ImplId;
use crate::identity::ServiceId;
use crate::invoker::Invoker;
use crate::locator::TargetLocator;
use crate::locator::WorkerDirectory;
use crate::manifest::Manifest;
use crate::repository::Repository;
use crate::router::DynamicRouter;
use crate::target::Target;
use crate::transport::Connector;

pub struct Broker {
    config: BrokerConfig,
    repository: Repository,
    executors: ExecutorRegistry,
    router: DynamicRouter,
    directory: Arc<WorkerDirectory>,
    locator: TargetLocator,
    balancer: LoadBalancer,
    plugins: Mutex<HashMap<String, Vec<ImplId>>>,
}

impl Broker {
    /// Creates a broker reaching remote targets through `connector`.
    ///
    /// Workers listed in the configuration are announced immediately.
    pub fn new(config: BrokerConfig, connector: Arc<dyn Connector>) -> Result<Arc<Self>> {
        config.validate()?;

        let directory = Arc::new(WorkerDirectory::new());
        let locator = TargetLocator::new(config.environment.clone(), Arc::clone(&directory));
        let balancer = LoadBalancer::new(
            config.strategy.build(),
            connector,
            config.formats()?,
            config.request_timeout(),
        );

        let broker = Self {
            config,
            repository: Repository::new(),
            executors: ExecutorRegistry::new(),
            router: DynamicRouter::new(),
            directory,
            locator,
            balancer,
            plugins: Mutex::new(HashMap::new()),
        };

        for worker in &broker.config.workers {
            broker.announce(worker.to_target()?, worker.impl_ids()?)?;
        }

        info!(
            worker = %broker.config.worker_id,
            environment = %broker.config.environment,
            strategy = broker.balancer.strategy().name(),
            "broker started"
        );
        Ok(Arc::new(broker))
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    pub fn router(&self) -> &DynamicRouter {
        &self.router
    }

    pub fn directory(&self) -> &WorkerDirectory {
        &self.directory
    }

    pub fn locator(&self) -> &TargetLocator {
        &self.locator
    }

    pub fn balancer(&self) -> &LoadBalancer {
        &self.balancer
    }

    /// The most preferred local format.
    pub fn default_format(&self) -> Format {
        self.balancer.formats().first().cloned().unwrap_or(Format::JSON)
    }

    /// This process as others should reach it.
    pub fn local_target(&self) -> Target {
        let mut target = Target::new(
            self.config.worker_id.clone(),
            self.config.host.clone(),
            self.config.environment.clone(),
        );
        target.endpoints = self.config.endpoints.clone();
        for format in self.balancer.formats() {
            target = target.with_format(format.clone());
        }
        target
    }

    /// Fitables this process serves to remote callers.
    pub fn local_fitables(&self) -> Vec<ImplId> {
        let mut ids: Vec<ImplId> = self
            .executors
            .executors()
            .into_iter()
            .filter(LocalExecutor::is_micro)
            .map(|e| e.impl_id().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn register_genericable(&self, builder: GenericableBuilder) -> Result<Arc<Genericable>> {
        let genericable = self.repository.register(builder)?;
        info!(
            service = %genericable.id(),
            fitables = genericable.fitables().len(),
            "genericable registered"
        );
        Ok(genericable)
    }

    /// Binds an in-process implementation. Its fitable is created if the
    /// genericable does not declare it yet.
    pub fn register_executor(&self, executor: LocalExecutor) -> Result<()> {
        self.repository.ensure_fitable(executor.impl_id())?;
        self.executors.register(executor)
    }

    /// Drains and removes the local executor of `impl_id`, then removes the
    /// fitable itself. Overrides routing to it are cleared.
    pub async fn unregister(&self, impl_id: &ImplId) -> Result<()> {
        let drained = self.executors.unregister(impl_id).await;
        let removed = match self.repository.remove_fitable(impl_id) {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };

        if !drained && !removed {
            return Err(Error::not_found(impl_id.to_string()));
        }

        if self.router.route(impl_id.service()).as_ref() == Some(impl_id) {
            self.router.clear_route(impl_id.service());
        }
        Ok(())
    }

    /// Registers a plugin's genericables and executors as one unit. On
    /// failure everything registered so far is removed again.
    pub async fn load(&self, manifest: Manifest) -> Result<()> {
        let (name, genericables, executors) = manifest.into_parts();
        self.reserve_plugin(&name)?;

        let mut registered = Vec::new();
        match self.load_parts(genericables, executors, &mut registered) {
            Ok(()) => {
                info!(plugin = %name, fitables = registered.len(), "plugin loaded");
                self.lock_plugins()?.insert(name, registered);
                Ok(())
            }
            Err(e) => {
                warn!(plugin = %name, error = %e, "plugin failed to load, rolling back");
                for impl_id in &registered {
                    if let Err(rollback) = self.unregister(impl_id).await {
                        warn!(
                            plugin = %name,
                            fitable = %impl_id,
                            error = %rollback,
                            "rollback could not remove fitable"
                        );
                    }
                }
                self.lock_plugins()?.remove(&name);
                Err(e)
            }
        }
    }

    /// Removes everything a plugin registered, draining in-flight calls.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let fitables = self
            .lock_plugins()?
            .remove(name)
            .ok_or_else(|| Error::not_found(format!("plugin {}", name)))?;

        for impl_id in &fitables {
            match self.unregister(impl_id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        info!(plugin = %name, fitables = fitables.len(), "plugin unloaded");
        Ok(())
    }

    pub fn plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .plugins
            .lock()
            .map(|plugins| plugins.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Records that `target` serves `fitables`, creating any fitable the
    /// repository does not know yet.
    pub fn announce(&self, target: Target, fitables: Vec<ImplId>) -> Result<()> {
        for impl_id in &fitables {
            self.repository.ensure_fitable(impl_id)?;
        }
        self.directory.announce(target, fitables);
        Ok(())
    }

    pub fn withdraw(&self, worker_id: &str) -> bool {
        self.directory.withdraw(worker_id)
    }

    pub fn genericable(&self, id: impl Into<String>, version: impl Into<String>) -> Result<Arc<Genericable>> {
        self.repository.get(&ServiceId::new(id, version)?)
    }

    /// A call handle factory for the genericable `id@version`.
    pub fn invoker(self: &Arc<Self>, id: impl Into<String>, version: impl Into<String>) -> Result<Invoker> {
        Ok(Invoker::new(Arc::clone(self), ServiceId::new(id, version)?))
    }

    fn load_parts(
        &self,
        genericables: Vec<GenericableBuilder>,
        executors: Vec<LocalExecutor>,
        registered: &mut Vec<ImplId>,
    ) -> Result<()> {
        for builder in genericables {
            let ids = builder.impl_ids()?;
            self.register_genericable(builder)?;
            registered.extend(ids);
        }
        for executor in executors {
            let impl_id = executor.impl_id().clone();
            let known = registered.contains(&impl_id);
            self.register_executor(executor)?;
            if !known {
                registered.push(impl_id);
            }
        }
        Ok(())
    }

    fn reserve_plugin(&self, name: &str) -> Result<()> {
        let mut plugins = self.lock_plugins()?;
        if plugins.contains_key(name) {
            return Err(Error::DuplicatePlugin(name.to_string()));
        }
        plugins.insert(name.to_string(), Vec::new());
        Ok(())
    }

    fn lock_plugins(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<ImplId>>>> {
        self.plugins
            .lock()
            .map_err(|_| Error::Internal("plugin table poisoned".into()))
    }
}
