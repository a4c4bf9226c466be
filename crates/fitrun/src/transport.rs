//! # Transport Abstraction
//!
//! A minimal, async interface for moving bytes between processes.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: A Transport knows nothing about frames, formats or
//!   services. It moves opaque buffers.
//! - **Request-Response**: The fundamental interaction model is "send bytes,
//!   await bytes". Duplex links that multiplex many calls are adapted to this
//!   model by `Peer`.
//! - **Pluggable**: Socket or HTTP framing lives behind `Connector`, outside
//!   this crate.

use std::fmt;
use std::sync::Arc;

use crate::target::Target;

/// Why bytes did not make it to a target and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No route to the target, or the link closed under an open call.
    ConnectionLost(String),
    /// No reply arrived within the attempt deadline.
    Timeout,
    /// Anything else the transport could not complete.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Target unreachable: {}", msg),
            Self::Timeout => write!(f, "No reply before the deadline"),
            Self::Io(msg) => write!(f, "Transport failure: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// One request-reply exchange with a single target, held as
/// `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends a payload and waits for the matching response.
    ///
    /// Returns the raw reply bytes. The payload is never inspected, and
    /// dropping the future abandons the exchange.
    async fn call(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// A duplex byte stream carrying many interleaved frames.
#[async_trait::async_trait]
pub trait Link: Send + Sync + 'static {
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Returns `Ok(None)` once the remote side has closed the link.
    async fn recv(&self) -> Result<Option<Vec<u8>>>;
}

/// Opens transports to targets.
///
/// Implementations may pool or cache connections; the balancer calls
/// `connect` once per attempt.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, target: &Target) -> Result<Arc<dyn Transport>>;
}
