//! Payload encoding helpers.
//!
//! Envelope payloads are opaque byte blobs at the session layer; these
//! helpers give handlers and dispatchers one place to (de)serialize the
//! typed payloads without depending on the codec crate directly.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::ProtocolError;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    postcard::to_stdvec(value).map_err(ProtocolError::Encode)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    postcard::from_bytes(bytes).map_err(ProtocolError::Decode)
}
