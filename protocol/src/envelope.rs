//! The framed unit on the wire: id, action tag, payload, optional error.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Direction marker. Requests carry the top bit clear; a response echoes
/// the request's id with the top bit set. The session reader uses the bit
/// to decide between resolving a waiter and dispatching a handler.
pub const RESPONSE_ID_BIT: u64 = 1 << 63;

/// Semantic operation carried by an envelope. The payload encoding is
/// determined entirely by the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Agent credentials and identity, sent once per connection.
    Handshake,
    /// Liveness probe; the response payload is empty.
    Ping,
    /// Run a command on the agent host.
    ExecuteCommand,
    /// Fetch recent command history from the agent.
    GetCommandHistory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u64,
    pub action: Action,
    pub payload: Vec<u8>,
    pub error: Option<String>,
}

impl Envelope {
    pub fn request(id: u64, action: Action, payload: Vec<u8>) -> Self {
        Self {
            id,
            action,
            payload,
            error: None,
        }
    }

    pub fn response(request_id: u64, action: Action, payload: Vec<u8>) -> Self {
        Self {
            id: request_id | RESPONSE_ID_BIT,
            action,
            payload,
            error: None,
        }
    }

    pub fn error_response(request_id: u64, action: Action, error: String) -> Self {
        Self {
            id: request_id | RESPONSE_ID_BIT,
            action,
            payload: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_response(&self) -> bool {
        self.id & RESPONSE_ID_BIT != 0
    }

    /// The id the requester minted, with the direction bit stripped.
    pub fn request_id(&self) -> u64 {
        self.id & !RESPONSE_ID_BIT
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        postcard::to_stdvec(self)
            .map(Bytes::from)
            .map_err(ProtocolError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        postcard::from_bytes(bytes).map_err(ProtocolError::Decode)
    }
}
