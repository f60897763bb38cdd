//! Wire protocol and session layer shared by the lookout hub and agent.
//!
//! Both programs speak length-prefixed binary frames over a single
//! persistent TCP connection. Each frame carries one [`Envelope`]; many
//! logical requests are multiplexed over the connection by a [`Session`],
//! which correlates response envelopes back to their waiting callers and
//! routes inbound requests through a [`HandlerRegistry`].

pub mod envelope;
pub mod error;
pub mod framing;
pub mod handler;
pub mod payload;
pub mod session;
pub mod types;

pub use envelope::{Action, Envelope, RESPONSE_ID_BIT};
pub use error::{ProtocolError, SessionError};
pub use framing::{FrameCodec, DEFAULT_MAX_FRAME_SIZE};
pub use handler::{ActionHandler, HandlerRegistry};
pub use session::{Session, SessionReader};
