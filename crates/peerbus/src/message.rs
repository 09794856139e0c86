// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message contract for user payload types.
//!
//! The core never interprets payload bytes. A payload type declares a type
//! name string and how to turn itself into bytes and back; the type name is
//! the only typing information carried on the wire, and type compatibility
//! between publisher and subscriber is a string comparison.

use crate::Result;

/// Contract implemented by every payload type exchanged over topics and
/// services.
pub trait Message: Send + Sync + 'static {
    /// Declared type name. Publisher and subscriber types match when their
    /// declared names are equal.
    fn type_name() -> &'static str
    where
        Self: Sized;

    /// Serialize into bytes.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the payload cannot be encoded.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Deserialize from bytes.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the bytes do not form a valid payload.
    fn decode(data: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// A plain UTF-8 string payload. Ships with the crate for examples, the CLI
/// and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringMsg {
    /// The carried string.
    pub data: String,
}

impl StringMsg {
    /// Create a message carrying `data`.
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

impl From<&str> for StringMsg {
    fn from(data: &str) -> Self {
        Self::new(data)
    }
}

impl Message for StringMsg {
    fn type_name() -> &'static str {
        "peerbus.msgs.StringMsg"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.data.as_bytes().to_vec())
    }

    fn decode(data: &[u8]) -> Result<Self> {
        let data = std::str::from_utf8(data)
            .map_err(|e| crate::Error::Serialization(e.to_string()))?
            .to_string();
        Ok(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_msg_round_trip() {
        let msg = StringMsg::from("HELLO");
        let bytes = msg.encode().expect("encode succeeds");
        let back = StringMsg::decode(&bytes).expect("decode succeeds");
        assert_eq!(back, msg);
    }

    #[test]
    fn test_string_msg_rejects_invalid_utf8() {
        assert!(StringMsg::decode(&[0xff, 0xfe]).is_err());
    }
}
