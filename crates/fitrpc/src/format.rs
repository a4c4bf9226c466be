//! # Formats
//!
//! A `Format` names a codec a process can produce and decode. Targets
//! advertise the formats they accept; callers negotiate one per call.
//!
//! ## Invariants
//! - Format identity is the numeric `code`; the name is informational.
//! - The code fits in one byte because it prefixes every frame on the wire.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

const JSON_CODE: u8 = 1;
const BINCODE_CODE: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Format {
    pub name: Cow<'static, str>,
    pub code: u8,
}

impl Format {
    /// Human readable JSON via `serde_json`.
    pub const JSON: Format = Format { name: Cow::Borrowed("json"), code: JSON_CODE };
    /// Compact binary via `bincode`.
    pub const BINCODE: Format = Format { name: Cow::Borrowed("bincode"), code: BINCODE_CODE };

    /// Every format this build can encode and decode.
    pub fn builtin() -> Vec<Format> {
        vec![Self::JSON, Self::BINCODE]
    }

    pub fn from_code(code: u8) -> Result<Format> {
        match code {
            JSON_CODE => Ok(Self::JSON),
            BINCODE_CODE => Ok(Self::BINCODE),
            other => Err(Error::UnknownFormat(other)),
        }
    }

    pub fn from_name(name: &str) -> Result<Format> {
        match name {
            "json" => Ok(Self::JSON),
            "bincode" => Ok(Self::BINCODE),
            other => Err(Error::UnknownFormatName(other.to_string())),
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self.code {
            JSON_CODE => Ok(serde_json::to_vec(value)?),
            BINCODE_CODE => Ok(bincode::serialize(value)?),
            other => Err(Error::UnknownFormat(other)),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self.code {
            JSON_CODE => Ok(serde_json::from_slice(bytes)?),
            BINCODE_CODE => Ok(bincode::deserialize(bytes)?),
            other => Err(Error::UnknownFormat(other)),
        }
    }
}

impl PartialEq for Format {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Format {}

impl std::hash::Hash for Format {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.code)
    }
}
