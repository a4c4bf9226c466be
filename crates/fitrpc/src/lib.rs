//! # FitRPC
//!
//! The logical wire envelope for genericable calls.
//!
//! ## Architecture
//!
//! This crate knows nothing about services, routing or transports. It defines
//! what travels between a caller and the process executing a fitable:
//! request and reply frames, the codecs (`Format`) that encode them, the
//! dynamic `Value` used for arguments and results, and the
//! `ExceptionEnvelope` that carries failures across the boundary.

pub mod error;
pub mod exception;
pub mod format;
pub mod frame;
pub mod value;

pub use error::Error;
pub use error::Result;
pub use exception::code;
pub use exception::ExceptionEnvelope;
pub use exception::ExceptionKind;
pub use format::Format;
pub use frame::decode_seq;
pub use frame::peek_format;
pub use frame::ReplyFrame;
pub use frame::RequestFrame;
pub use frame::RpcFrame;
pub use value::Value;

#[cfg(test)]
mod tests;
