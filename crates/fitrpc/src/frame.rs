//! # Protocol Frames
//!
//! Defines the logical envelope of a genericable call (Request vs Reply).
//!
//! On the wire a frame is one format byte followed by the frame encoded with
//! that format. The receiver reads the byte, picks the codec, and answers in
//! the same format.
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.
//! - **Format Echo**: A reply is always encoded in the format of its request.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::exception::code;
use crate::exception::ExceptionKind;
use crate::exception::ExceptionEnvelope;
use crate::format::Format;
use crate::value::Value;

/// An outbound call to a genericable.
///
/// `impl_id` is absent when the caller leaves the choice of implementation
/// to the receiving process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub seq: u64,
    pub service_id: String,
    pub service_version: String,
    pub impl_id: Option<String>,
    pub impl_version: Option<String>,
    pub attributes: BTreeMap<String, String>,
    /// Positional arguments, encoded with the frame's format.
    pub args: Vec<u8>,
}

impl RequestFrame {
    pub fn new(seq: u64, service_id: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            seq,
            service_id: service_id.into(),
            service_version: service_version.into(),
            impl_id: None,
            impl_version: None,
            attributes: BTreeMap::new(),
            args: Vec::new(),
        }
    }

    pub fn with_impl(mut self, impl_id: impl Into<String>, impl_version: Option<String>) -> Self {
        self.impl_id = Some(impl_id.into());
        self.impl_version = impl_version;
        self
    }

    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Encodes the positional arguments with `format` into the frame.
    pub fn with_args(mut self, format: &Format, args: &[Value]) -> Result<Self> {
        self.args = format.encode(&args)?;
        Ok(self)
    }

    pub fn decode_args(&self, format: &Format) -> Result<Vec<Value>> {
        if self.args.is_empty() {
            return Ok(Vec::new());
        }
        format.decode(&self.args)
    }
}

/// The answer to a `RequestFrame`.
///
/// Without an `exception` kind the reply carries an optional payload;
/// with one it carries the exception fields instead. The code alone never
/// decides success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub seq: u64,
    pub exception: Option<ExceptionKind>,
    pub code: i32,
    pub message: String,
    pub properties: BTreeMap<String, String>,
    pub service_id: Option<String>,
    pub impl_id: Option<String>,
    pub payload: Option<Vec<u8>>,
}

impl ReplyFrame {
    /// A successful reply carrying `value` encoded with `format`.
    pub fn ok(seq: u64, format: &Format, value: &Value) -> Result<Self> {
        let payload = match value {
            Value::Unit => None,
            other => Some(format.encode(other)?),
        };
        Ok(Self {
            seq,
            exception: None,
            code: code::OK,
            message: String::new(),
            properties: BTreeMap::new(),
            service_id: None,
            impl_id: None,
            payload,
        })
    }

    /// A failed reply carrying the exception fields of `envelope`.
    pub fn failure(seq: u64, envelope: ExceptionEnvelope) -> Self {
        Self {
            seq,
            exception: Some(envelope.kind),
            code: envelope.code,
            message: envelope.message,
            properties: envelope.properties,
            service_id: Some(envelope.service_id),
            impl_id: Some(envelope.impl_id),
            payload: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.exception.is_none()
    }

    /// Splits the reply into a decoded value or the remote exception.
    ///
    /// The outer `Result` is a wire failure; the inner one is the call outcome.
    pub fn into_status(self, format: &Format) -> Result<std::result::Result<Value, ExceptionEnvelope>> {
        let Some(kind) = self.exception else {
            let value = match self.payload {
                Some(bytes) => format.decode(&bytes)?,
                None => Value::Unit,
            };
            return Ok(Ok(value));
        };

        Ok(Err(ExceptionEnvelope {
            service_id: self.service_id.unwrap_or_default(),
            impl_id: self.impl_id.unwrap_or_default(),
            kind,
            code: self.code,
            message: self.message,
            properties: self.properties,
        }))
    }
}

/// Top-level frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcFrame {
    Request(RequestFrame),
    Reply(ReplyFrame),
}

impl RpcFrame {
    pub fn seq(&self) -> u64 {
        match self {
            Self::Request(req) => req.seq,
            Self::Reply(reply) => reply.seq,
        }
    }

    /// Encodes the frame behind a one byte format prefix.
    pub fn encode(&self, format: &Format) -> Result<Vec<u8>> {
        let body = format.encode(self)?;
        let mut bytes = Vec::with_capacity(body.len() + 1);
        bytes.push(format.code);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decodes a frame and reports the format it was written in.
    pub fn decode(bytes: &[u8]) -> Result<(Format, RpcFrame)> {
        let format = peek_format(bytes)?;
        let frame = format.decode(&bytes[1..])?;
        Ok((format, frame))
    }
}

/// Reads the format prefix without decoding the body.
///
/// Useful for answering a frame whose body turned out to be malformed.
pub fn peek_format(bytes: &[u8]) -> Result<Format> {
    let Some(first) = bytes.first() else {
        return Err(Error::ProtocolViolation("Empty frame".into()));
    };
    Format::from_code(*first)
}

/// Decodes just the sequence number from a raw frame.
/// This is useful for routing replies back to their pending callers.
pub fn decode_seq(bytes: &[u8]) -> Result<u64> {
    let (_, frame) = RpcFrame::decode(bytes)?;
    Ok(frame.seq())
}
