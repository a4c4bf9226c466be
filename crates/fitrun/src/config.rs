//! # Broker Configuration
//!
//! Everything a broker needs to know about itself and the static part of its
//! world, loadable from TOML:
//!
//! ```toml
//! worker_id = "pay-1"
//! environment = "prod"
//! formats = ["bincode", "json"]
//! strategy = "round-robin"
//! call_timeout_ms = 3000
//!
//! [[workers]]
//! worker_id = "pay-2"
//! host = "10.0.0.2"
//! environment = "prod"
//! formats = ["json"]
//! fitables = [{ service = "pay.charge", service_version = "1.0.0", fitable = "card", fitable_version = "1" }]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use fitrpc::Format;
use serde::Deserialize;

use crate::balancer::StrategyKind;
use crate::identity::ImplId;
use crate::target::Endpoint;
use crate::target::Target;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The TOML document did not match the expected shape.
    Parse(String),
    /// The file could not be read.
    Io(String),
    /// The document parsed but describes an unusable broker.
    Invalid(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "Malformed configuration: {}", msg),
            Self::Io(msg) => write!(f, "Cannot read configuration: {}", msg),
            Self::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A fitable a statically configured worker serves.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FitableRef {
    pub service: String,
    pub service_version: String,
    pub fitable: String,
    pub fitable_version: String,
}

impl FitableRef {
    pub fn to_impl_id(&self) -> Result<ImplId> {
        ImplId::parts(
            self.service.clone(),
            self.service_version.clone(),
            self.fitable.clone(),
            self.fitable_version.clone(),
        )
        .map_err(|e| Error::Invalid(e.to_string()))
    }
}

/// A remote worker known before any announcement arrives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkerConfig {
    pub worker_id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub fitables: Vec<FitableRef>,
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl WorkerConfig {
    pub fn to_target(&self) -> Result<Target> {
        let mut target = Target::new(self.worker_id.clone(), self.host.clone(), self.environment.clone());
        target.endpoints = self.endpoints.clone();
        target.extensions = self.extensions.clone();
        for format in parse_formats(&self.formats)? {
            target = target.with_format(format);
        }
        Ok(target)
    }

    pub fn impl_ids(&self) -> Result<Vec<ImplId>> {
        self.fitables.iter().map(FitableRef::to_impl_id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub worker_id: String,
    pub host: String,
    /// Only targets in this environment are ever called.
    pub environment: String,
    pub endpoints: Vec<Endpoint>,
    /// Formats this process produces, most preferred first.
    pub formats: Vec<String>,
    pub strategy: StrategyKind,
    /// Upper bound on a whole call, retries and degradation included.
    pub call_timeout_ms: u64,
    /// Upper bound on a single attempt against one target.
    pub request_timeout_ms: u64,
    /// How many degradation pointers one call may follow.
    pub degradation_hops: usize,
    pub workers: Vec<WorkerConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            worker_id: "local".to_string(),
            host: "localhost".to_string(),
            environment: "default".to_string(),
            endpoints: Vec::new(),
            formats: vec!["bincode".to_string(), "json".to_string()],
            strategy: StrategyKind::default(),
            call_timeout_ms: 5_000,
            request_timeout_ms: 1_000,
            degradation_hops: 1,
            workers: Vec::new(),
        }
    }
}

impl BrokerConfig {
    pub fn new(worker_id: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            environment: environment.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.formats = formats.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = millis_rounded_up(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = millis_rounded_up(timeout);
        self
    }

    pub fn with_degradation_hops(mut self, hops: usize) -> Self {
        self.degradation_hops = hops;
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.workers.push(worker);
        self
    }

    /// Local formats in preference order.
    pub fn formats(&self) -> Result<Vec<Format>> {
        parse_formats(&self.formats)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_id.trim().is_empty() {
            return Err(Error::Invalid("worker_id must not be blank".into()));
        }
        if self.formats()?.is_empty() {
            return Err(Error::Invalid("at least one format is required".into()));
        }
        if self.call_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::Invalid("timeouts must be positive".into()));
        }
        for worker in &self.workers {
            if worker.worker_id.trim().is_empty() {
                return Err(Error::Invalid("worker entries need a worker_id".into()));
            }
            worker.to_target()?;
            worker.impl_ids()?;
        }
        Ok(())
    }
}

/// Whole milliseconds, never rounding a non-zero duration down to zero.
fn millis_rounded_up(timeout: Duration) -> u64 {
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}

fn parse_formats(names: &[String]) -> Result<Vec<Format>> {
    let mut formats: Vec<Format> = Vec::with_capacity(names.len());
    for name in names {
        let format = Format::from_name(name).map_err(|e| Error::Invalid(e.to_string()))?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    Ok(formats)
}
