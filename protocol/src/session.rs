//! Multiplexed request/response session over one framed TCP connection.
//!
//! A [`Session`] is shared by `Arc` between everything that wants to talk
//! on the connection. Writes are serialized through a mutex on the sink
//! half; the read half is driven exclusively by the [`SessionReader`]
//! task, which resolves response envelopes against the waiter table and
//! hands inbound requests to the handler registry.
//!
//! Every request id the session writes is resolved exactly once: by a
//! matching response, by the caller's timeout discarding the waiter, or
//! by `close()` failing all pending waiters on disconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::envelope::{Action, Envelope};
use crate::error::SessionError;
use crate::framing::FrameCodec;
use crate::handler::HandlerRegistry;

type Transport = Framed<TcpStream, FrameCodec>;

pub struct Session {
    writer: Mutex<SplitSink<Transport, Bytes>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Envelope>>>,
    next_id: AtomicU64,
    connected: AtomicBool,
    peer: String,
}

impl Session {
    /// Wrap a fresh connection. Returns the shared session and the reader
    /// that must be driven (usually on its own task) for responses and
    /// inbound requests to flow.
    pub fn new(stream: TcpStream, max_frame_size: usize) -> (Arc<Self>, SessionReader) {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let framed = Framed::new(stream, FrameCodec::with_max_size(max_frame_size));
        Self::from_framed(framed, peer)
    }

    /// Wrap an already-framed transport, e.g. after a handshake exchange
    /// that was driven directly on the framed stream.
    pub fn from_framed(framed: Transport, peer: String) -> (Arc<Self>, SessionReader) {
        let (writer, reader) = framed.split();
        let session = Arc::new(Self {
            writer: Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            peer,
        });
        let session_reader = SessionReader {
            session: session.clone(),
            reader,
        };
        (session, session_reader)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Send a request and wait for the matching response. Concurrent
    /// calls are expected; responses may resolve in any order.
    pub async fn send_and_wait(
        &self,
        action: Action,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Envelope, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::Disconnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.write(Envelope::request(id, action, payload)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(envelope)) => Ok(envelope),
            // The waiter's sender was dropped: the session closed.
            Ok(Err(_)) => Err(SessionError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(SessionError::ResponseTimeout)
            }
        }
    }

    /// Write a response envelope for an inbound request. Never consults
    /// the waiter table.
    pub async fn send_response(
        &self,
        request_id: u64,
        action: Action,
        payload: Vec<u8>,
        error: Option<String>,
    ) -> Result<(), SessionError> {
        let envelope = match error {
            Some(error) => Envelope::error_response(request_id, action, error),
            None => Envelope::response(request_id, action, payload),
        };
        self.write(envelope).await
    }

    /// Shut the connection down and fail every pending waiter. Safe to
    /// call any number of times.
    pub async fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        {
            let mut writer = self.writer.lock().await;
            let _ = writer.close().await;
        }

        // Dropping the senders resolves the waiters with Disconnected.
        let mut pending = self.pending.lock().await;
        let abandoned = pending.len();
        pending.clear();
        if abandoned > 0 {
            debug!(
                "Session to {} closed with {} pending request(s)",
                self.peer, abandoned
            );
        }
    }

    async fn write(&self, envelope: Envelope) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::Disconnected);
        }
        let bytes = envelope.encode()?;
        let mut writer = self.writer.lock().await;
        writer.send(bytes).await.map_err(|e| {
            // A dead socket will also surface in the reader, which closes
            // the session; just report this write's failure.
            self.connected.store(false, Ordering::SeqCst);
            SessionError::Protocol(e)
        })
    }

    /// Resolve a response envelope against the waiter table. A response
    /// with no waiter (late arrival after a timeout, or a bogus id from
    /// the peer) is dropped without injecting any state.
    async fn complete(&self, envelope: Envelope) {
        let id = envelope.request_id();
        let waiter = self.pending.lock().await.remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(envelope);
            }
            None => {
                debug!(
                    "Dropping response with unknown request id {} from {}",
                    id, self.peer
                );
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Owns the read half of the connection. [`SessionReader::run`] drives it
/// until the peer disconnects or a protocol error terminates the session.
pub struct SessionReader {
    session: Arc<Session>,
    reader: SplitStream<Transport>,
}

impl SessionReader {
    /// Decode and route envelopes until the connection ends. Any decode
    /// failure, I/O error, or oversize frame is fatal. Always leaves the
    /// session closed with pending waiters failed.
    pub async fn run(mut self, handlers: Arc<HandlerRegistry>) {
        while let Some(frame) = self.reader.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Session to {} failed: {}", self.session.peer, e);
                    break;
                }
            };

            let envelope = match Envelope::decode(&frame) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!("Undecodable envelope from {}: {}", self.session.peer, e);
                    break;
                }
            };

            if envelope.is_response() {
                self.session.complete(envelope).await;
            } else {
                // One task per inbound request so a slow handler cannot
                // stall other traffic on this connection.
                let session = self.session.clone();
                let handlers = handlers.clone();
                tokio::spawn(async move {
                    handlers.dispatch(session, envelope).await;
                });
            }
        }

        self.session.close().await;
    }
}
