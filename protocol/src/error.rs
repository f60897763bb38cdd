//! Error types for the wire and session layers.

use thiserror::Error;

/// Errors raised while framing or encoding envelopes. Any of these is
/// fatal for the connection that produced it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame declared (or would require) more bytes than the ceiling.
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },

    #[error("envelope encoding failed: {0}")]
    Encode(postcard::Error),

    #[error("envelope decoding failed: {0}")]
    Decode(postcard::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced to callers of [`crate::Session::send_and_wait`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session closed before (or while) the call completed. All
    /// pending waiters resolve to this when the connection drops.
    #[error("session disconnected")]
    Disconnected,

    /// The caller's deadline elapsed before a response arrived. The
    /// waiter is discarded; a late response is dropped by the reader.
    #[error("timed out waiting for response")]
    ResponseTimeout,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
