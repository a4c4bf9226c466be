//! # Identity
//!
//! Value-typed keys for services and their implementations. Both are used as
//! map keys across every registry, so equality, hashing and ordering are
//! derived from the field values alone.

/// Identity errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required field was empty or whitespace only.
    Blank(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank(field) => write!(f, "{} must not be blank", field),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

fn non_blank(field: &'static str, value: impl Into<String>) -> Result<String> {
    let value = value.into();
    if value.trim().is_empty() {
        return Err(Error::Blank(field));
    }
    Ok(value)
}

/// Identifies a genericable: a service contract at a specific version.
///
/// Ordered by id, then version.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServiceId {
    id: String,
    version: String,
}

impl ServiceId {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        Ok(Self {
            id: non_blank("service id", id)?,
            version: non_blank("service version", version)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Identifies one fitable of a genericable.
///
/// Ordered by service, then implementation id, then implementation version.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImplId {
    service: ServiceId,
    id: String,
    version: String,
}

impl ImplId {
    pub fn new(service: ServiceId, id: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        Ok(Self {
            service,
            id: non_blank("fitable id", id)?,
            version: non_blank("fitable version", version)?,
        })
    }

    /// Shorthand building both halves from plain strings.
    pub fn parts(
        service_id: impl Into<String>,
        service_version: impl Into<String>,
        id: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        Self::new(ServiceId::new(service_id, service_version)?, id, version)
    }

    pub fn service(&self) -> &ServiceId {
        &self.service
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The implementation half alone, as carried in exception envelopes.
    pub fn fitable_label(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }
}

impl std::fmt::Display for ImplId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}@{}", self.service, self.id, self.version)
    }
}
