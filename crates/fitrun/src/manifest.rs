//! # Plugin Manifests
//!
//! A plugin declares everything it contributes in one explicit table:
//! the genericables (with their fitables) and the local executors bound to
//! them. `Broker::load` registers the table as a unit and `Broker::unload`
//! removes it, draining in-flight calls first.

use crate::executor::LocalExecutor;
use crate::genericable::GenericableBuilder;

#[derive(Debug, Clone)]
pub struct Manifest {
    name: String,
    genericables: Vec<GenericableBuilder>,
    executors: Vec<LocalExecutor>,
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            genericables: Vec::new(),
            executors: Vec::new(),
        }
    }

    pub fn genericable(mut self, genericable: GenericableBuilder) -> Self {
        self.genericables.push(genericable);
        self
    }

    pub fn executor(mut self, executor: LocalExecutor) -> Self {
        self.executors.push(executor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn genericables(&self) -> &[GenericableBuilder] {
        &self.genericables
    }

    pub fn executors(&self) -> &[LocalExecutor] {
        &self.executors
    }

    pub(crate) fn into_parts(self) -> (String, Vec<GenericableBuilder>, Vec<LocalExecutor>) {
        (self.name, self.genericables, self.executors)
    }
}
