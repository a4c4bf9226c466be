//! # Error Taxonomy
//!
//! One error type flows through resolution, balancing, invocation and
//! dispatch. The variants fall into four classes that callers act on
//! differently:
//!
//! - **Not found**: never retried.
//! - **Transport** (`Unreachable`, `Unavailable`, `Timeout`,
//!   `AllTargetsUnreachable`):
//!   retried across targets within a call and eligible for degradation.
//! - **Configuration** (`NoCompatibleFormat`, `Config`, ...): never retried.
//! - **Business**: raised by an implementation's own logic, propagated
//!   unchanged end to end.

use std::collections::BTreeMap;

use crate::config;
use crate::identity;
use crate::identity::ImplId;
use crate::identity::ServiceId;
use crate::transport;

/// Where a remote failure was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub service_id: String,
    pub impl_id: String,
}

impl Origin {
    pub fn new(service_id: impl Into<String>, impl_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            impl_id: impl_id.into(),
        }
    }

    pub fn of(impl_id: &ImplId) -> Self {
        Self::new(impl_id.service().to_string(), impl_id.fitable_label())
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.service_id, self.impl_id)
    }
}

/// A failure raised by an implementation's own logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessError {
    pub code: i32,
    pub message: String,
    pub properties: BTreeMap<String, String>,
    /// Filled in once the error has crossed a process boundary.
    pub origin: Option<Origin>,
}

impl BusinessError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            properties: BTreeMap::new(),
            origin: None,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

impl std::fmt::Display for BusinessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(origin) = &self.origin {
            write!(f, " (from {})", origin)?;
        }
        Ok(())
    }
}

impl std::error::Error for BusinessError {}

#[derive(Debug, Clone)]
pub enum Error {
    /// A service or implementation key failed validation.
    Identity(identity::Error),
    /// The service, fitable or executor was never registered.
    NotFound { what: String, origin: Option<Origin> },
    /// Neither a pinned route, an override nor a default names a fitable.
    NoRouteAvailable { service: String, origin: Option<Origin> },
    /// A single target (or the fitable as a whole) could not be reached.
    Unreachable { subject: String, reason: String },
    /// The target knows the fitable but is draining it and takes no new calls.
    Unavailable { fitable: String, origin: Option<Origin> },
    /// A call or a single attempt ran out of time.
    Timeout { subject: String },
    /// Every candidate target failed at the transport level.
    AllTargetsUnreachable { fitable: String, attempts: usize },
    /// No candidate target decodes a format this process produces.
    NoCompatibleFormat { fitable: String },
    /// An implementation's own failure.
    Business(BusinessError),
    /// A genericable declared the same fitable twice.
    DuplicateFitable(ImplId),
    /// A local executor is already bound to this fitable.
    DuplicateExecutor(ImplId),
    /// A plugin with this name is already loaded.
    DuplicatePlugin(String),
    /// A degradation pointer names a fitable outside its genericable.
    InvalidDegradation { fitable: ImplId, degradation: String },
    /// A filter refused the call.
    Rejected { message: String, origin: Option<Origin> },
    /// The call was cancelled before it completed.
    Cancelled,
    /// The envelope could not be encoded or decoded.
    Rpc(fitrpc::Error),
    /// Configuration was malformed or inconsistent.
    Config(config::Error),
    /// A remote system failure with no local counterpart.
    Remote(fitrpc::ExceptionEnvelope),
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into(), origin: None }
    }

    pub fn no_route(service: &ServiceId) -> Self {
        Self::NoRouteAvailable { service: service.to_string(), origin: None }
    }

    pub fn unreachable(subject: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::Unreachable { subject: subject.to_string(), reason: reason.into() }
    }

    pub fn timeout(subject: impl std::fmt::Display) -> Self {
        Self::Timeout { subject: subject.to_string() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected { message: message.into(), origin: None }
    }

    /// Transport-class failures: retried across targets and eligible for degradation.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. }
                | Self::Unavailable { .. }
                | Self::Timeout { .. }
                | Self::AllTargetsUnreachable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_business(&self) -> bool {
        matches!(self, Self::Business(_))
    }

    /// The remote implementation that produced this error, if it crossed a boundary.
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Self::NotFound { origin, .. }
            | Self::NoRouteAvailable { origin, .. }
            | Self::Unavailable { origin, .. }
            | Self::Rejected { origin, .. } => origin.as_ref(),
            Self::Business(e) => e.origin.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity(e) => write!(f, "Invalid identity: {}", e),
            Self::NotFound { what, origin: Some(o) } => write!(f, "Not found: {} (from {})", what, o),
            Self::NotFound { what, origin: None } => write!(f, "Not found: {}", what),
            Self::NoRouteAvailable { service, .. } => write!(f, "No route available for {}", service),
            Self::Unreachable { subject, reason } => write!(f, "Unreachable: {}: {}", subject, reason),
            Self::Unavailable { fitable, .. } => write!(f, "Draining, no new calls: {}", fitable),
            Self::Timeout { subject } => write!(f, "Timed out: {}", subject),
            Self::AllTargetsUnreachable { fitable, attempts } => {
                write!(f, "All targets unreachable for {} after {} attempts", fitable, attempts)
            }
            Self::NoCompatibleFormat { fitable } => write!(f, "No compatible format for {}", fitable),
            Self::Business(e) => write!(f, "Business exception: {}", e),
            Self::DuplicateFitable(id) => write!(f, "Duplicate fitable: {}", id),
            Self::DuplicateExecutor(id) => write!(f, "Duplicate local executor: {}", id),
            Self::DuplicatePlugin(name) => write!(f, "Plugin already loaded: {}", name),
            Self::InvalidDegradation { fitable, degradation } => {
                write!(f, "Fitable {} degrades to unknown fitable '{}'", fitable, degradation)
            }
            Self::Rejected { message, .. } => write!(f, "Rejected: {}", message),
            Self::Cancelled => write!(f, "Call cancelled"),
            Self::Rpc(e) => write!(f, "RPC error: {}", e),
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::Remote(envelope) => write!(f, "Remote failure: {}", envelope),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Identity(e) => Some(e),
            Self::Business(e) => Some(e),
            Self::Rpc(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<identity::Error> for Error {
    fn from(e: identity::Error) -> Self {
        Self::Identity(e)
    }
}

impl From<fitrpc::Error> for Error {
    fn from(e: fitrpc::Error) -> Self {
        Self::Rpc(e)
    }
}

impl From<config::Error> for Error {
    fn from(e: config::Error) -> Self {
        Self::Config(e)
    }
}

impl From<BusinessError> for Error {
    fn from(e: BusinessError) -> Self {
        Self::Business(e)
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        match e {
            transport::Error::Timeout => Self::Timeout { subject: "transport".into() },
            other => Self::Unreachable { subject: "transport".into(), reason: other.to_string() },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
