//! Inbound request dispatch: a tag-to-handler mapping populated at
//! startup.
//!
//! Each inbound request runs in its own task so a slow command cannot
//! block other traffic on the session. The dispatch boundary enforces the
//! handler's deadline and contains panics; whatever happens, exactly one
//! response envelope goes back for the request id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::envelope::{Action, Envelope};
use crate::session::Session;

/// A single wire operation. Implementations decode their payload, do the
/// work, and return the encoded response payload.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, payload: Vec<u8>) -> anyhow::Result<Vec<u8>>;

    /// Deadline enforced at the dispatch boundary, independent of any
    /// deadline the handler applies internally.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Maps action tags to handlers. Registered once at startup, then shared
/// immutably across every request task.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Action, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: Action, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action, handler);
    }

    /// Run the handler for one inbound request and send exactly one
    /// response for its id.
    pub async fn dispatch(&self, session: Arc<Session>, request: Envelope) {
        let Envelope {
            id,
            action,
            payload,
            ..
        } = request;

        let Some(handler) = self.handlers.get(&action).cloned() else {
            warn!("No handler registered for {:?}", action);
            let _ = session
                .send_response(id, action, Vec::new(), Some(format!("unknown action {action:?}")))
                .await;
            return;
        };

        let deadline = handler.timeout();
        // The handler runs in its own task so a panic becomes a JoinError
        // instead of tearing down the session reader.
        let work = tokio::spawn(async move { handler.handle(payload).await });

        let outcome = match tokio::time::timeout(deadline, work).await {
            Ok(Ok(Ok(response))) => session.send_response(id, action, response, None).await,
            Ok(Ok(Err(e))) => {
                debug!("Handler for {:?} failed: {}", action, e);
                session
                    .send_response(id, action, Vec::new(), Some(e.to_string()))
                    .await
            }
            Ok(Err(join_err)) => {
                warn!("Handler for {:?} panicked: {}", action, join_err);
                session
                    .send_response(id, action, Vec::new(), Some("handler panicked".to_string()))
                    .await
            }
            Err(_) => {
                warn!("Handler for {:?} exceeded its {:?} deadline", action, deadline);
                session
                    .send_response(
                        id,
                        action,
                        Vec::new(),
                        Some("handler deadline exceeded".to_string()),
                    )
                    .await
            }
        };

        if let Err(e) = outcome {
            debug!("Could not send response for request {}: {}", id, e);
        }
    }
}
