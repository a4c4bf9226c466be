//! # Error Definitions
//!
//! Failures of the wire layer itself. These never describe a remote
//! implementation failing; that is what an `ExceptionEnvelope` is for.

/// Operational failures within the RPC envelope mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The format codec failed to encode or decode a value.
    Serialization(String),
    /// A frame or format lookup named a code this build does not know.
    UnknownFormat(u8),
    /// A format lookup named a codec this build does not know.
    UnknownFormatName(String),
    /// The frame was structurally malformed (empty, truncated, wrong kind).
    ProtocolViolation(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(msg) => write!(f, "serialization failed: {}", msg),
            Self::UnknownFormat(code) => write!(f, "unknown format code: {}", code),
            Self::UnknownFormatName(name) => write!(f, "unknown format: {}", name),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// A specialized Result type for envelope operations.
pub type Result<T> = std::result::Result<T, Error>;
