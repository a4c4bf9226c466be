//! # Targets
//!
//! A `Target` is one reachable process able to execute a fitable: where it
//! runs, which environment it belongs to, how to reach it and which formats
//! it decodes.

use std::collections::BTreeMap;

use fitrpc::Format;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub protocol: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(protocol: impl Into<String>, port: u16) -> Self {
        Self { protocol: protocol.into(), port }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.protocol, self.port)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub worker_id: String,
    pub host: String,
    pub environment: String,
    pub endpoints: Vec<Endpoint>,
    pub formats: Vec<Format>,
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl Target {
    pub fn new(worker_id: impl Into<String>, host: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            host: host.into(),
            environment: environment.into(),
            endpoints: Vec::new(),
            formats: Vec::new(),
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        if !self.formats.contains(&format) {
            self.formats.push(format);
        }
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }

    pub fn supports(&self, format: &Format) -> bool {
        self.formats.contains(format)
    }

    /// Picks the first of the caller's `preferred` formats this target decodes.
    pub fn negotiate(&self, preferred: &[Format]) -> Option<Format> {
        preferred.iter().find(|f| self.supports(f)).cloned()
    }

    pub fn primary_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.first()
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}[{}]", self.worker_id, self.host, self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiate_follows_caller_preference() {
        let target = Target::new("w1", "10.0.0.1", "prod")
            .with_format(Format::JSON)
            .with_format(Format::BINCODE);

        assert_eq!(target.negotiate(&[Format::BINCODE, Format::JSON]), Some(Format::BINCODE));
        assert_eq!(target.negotiate(&[Format::JSON]), Some(Format::JSON));
    }

    #[test]
    fn test_negotiate_without_overlap() {
        let target = Target::new("w1", "10.0.0.1", "prod").with_format(Format::JSON);
        assert_eq!(target.negotiate(&[Format::BINCODE]), None);
        assert_eq!(Target::new("w2", "h", "prod").negotiate(&[Format::JSON]), None);
    }

    #[test]
    fn test_formats_are_not_duplicated() {
        let target = Target::new("w1", "h", "dev")
            .with_format(Format::JSON)
            .with_format(Format::JSON)
            .with_endpoint(Endpoint::new("http", 8080));
        assert_eq!(target.formats.len(), 1);
        assert_eq!(target.primary_endpoint().map(|e| e.to_string()), Some("http:8080".to_string()));
    }
}
