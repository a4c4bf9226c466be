//! # Exception Envelopes
//!
//! The wire-safe carrier for any failure crossing a process boundary.
//!
//! An envelope is pure data: the originating service and implementation,
//! whether the failure is the implementation's own or the routing core's,
//! a numeric code, a message and a flat string property map. Callers turn it
//! back into a native error; the envelope itself never interprets the code.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Reserved system codes.
///
/// Codes inside the system range are produced by the routing core itself.
/// Whether a reply failed is carried by its `ExceptionKind`, never by the
/// code, so a business exception may use any code, these included.
pub mod code {
    pub const OK: i32 = 0;

    pub const NOT_FOUND: i32 = 0x7F00_0001;
    pub const NO_ROUTE: i32 = 0x7F00_0002;
    pub const UNREACHABLE: i32 = 0x7F00_0003;
    pub const TIMEOUT: i32 = 0x7F00_0004;
    pub const NO_COMPATIBLE_FORMAT: i32 = 0x7F00_0005;
    pub const REJECTED: i32 = 0x7F00_0006;
    pub const PROTOCOL_VIOLATION: i32 = 0x7F00_0007;
    pub const CANCELLED: i32 = 0x7F00_0008;
    /// The fitable exists on the worker but is draining and takes no new calls.
    pub const UNAVAILABLE: i32 = 0x7F00_0009;
    pub const INTERNAL: i32 = 0x7F00_00FF;

    const SYSTEM_MIN: i32 = 0x7F00_0000;
    const SYSTEM_MAX: i32 = 0x7F00_FFFF;

    /// Whether the code is reserved for routing-core failures.
    pub fn is_system(code: i32) -> bool {
        (SYSTEM_MIN..=SYSTEM_MAX).contains(&code)
    }
}

/// Who raised an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionKind {
    /// The implementation's own failure; its code is opaque to the core.
    Business,
    /// A routing-core failure; its code is one of `code::*`.
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEnvelope {
    pub service_id: String,
    pub impl_id: String,
    pub kind: ExceptionKind,
    pub code: i32,
    pub message: String,
    pub properties: BTreeMap<String, String>,
}

impl ExceptionEnvelope {
    pub fn new(
        service_id: impl Into<String>,
        impl_id: impl Into<String>,
        kind: ExceptionKind,
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service_id: service_id.into(),
            impl_id: impl_id.into(),
            kind,
            code,
            message: message.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn business(
        service_id: impl Into<String>,
        impl_id: impl Into<String>,
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::new(service_id, impl_id, ExceptionKind::Business, code, message)
    }

    pub fn system(
        service_id: impl Into<String>,
        impl_id: impl Into<String>,
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::new(service_id, impl_id, ExceptionKind::System, code, message)
    }

    pub fn is_system(&self) -> bool {
        self.kind == ExceptionKind::System
    }
}

impl std::fmt::Display for ExceptionEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} (service={}, impl={})",
            self.code, self.message, self.service_id, self.impl_id
        )
    }
}
