//! RPC dispatch from the HTTP layer down to a specific agent session.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use lookout_protocol::types::{CommandRequest, CommandResponse, HistoryEntry, HistoryRequest};
use lookout_protocol::{payload, Action, Session, SessionError};

use crate::registry::{AgentRegistry, AgentStatus};

/// Hub-side deadline for one RPC exchange. Deliberately independent of
/// the command's own timeout: an abandoned RPC does not cancel the
/// command on the agent, which stays the authority for its host.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("agent not found")]
    AgentNotFound,

    #[error("agent is offline")]
    AgentOffline,

    #[error("command execution timed out")]
    RpcTimeout,

    #[error("agent disconnected")]
    Disconnected,

    /// Envelope-level error reported by the agent's handler boundary.
    #[error("{0}")]
    Agent(String),

    #[error("invalid agent response: {0}")]
    InvalidResponse(String),
}

pub struct CommandDispatcher {
    registry: Arc<AgentRegistry>,
    rpc_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self::with_timeout(registry, DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(registry: Arc<AgentRegistry>, rpc_timeout: Duration) -> Self {
        Self {
            registry,
            rpc_timeout,
        }
    }

    pub async fn execute_command(
        &self,
        agent_id: &str,
        request: CommandRequest,
    ) -> Result<CommandResponse, DispatchError> {
        let envelope = self
            .call(agent_id, Action::ExecuteCommand, encode(&request)?)
            .await?;
        decode(&envelope.payload)
    }

    pub async fn command_history(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, DispatchError> {
        let request = HistoryRequest { limit };
        let envelope = self
            .call(agent_id, Action::GetCommandHistory, encode(&request)?)
            .await?;
        decode(&envelope.payload)
    }

    /// Look the agent up, require it online, run one RPC with the
    /// hub-side deadline, and surface envelope-level errors.
    async fn call(
        &self,
        agent_id: &str,
        action: Action,
        request: Vec<u8>,
    ) -> Result<lookout_protocol::Envelope, DispatchError> {
        let session = self.online_session(agent_id).await?;

        let envelope = session
            .send_and_wait(action, request, self.rpc_timeout)
            .await
            .map_err(|e| match e {
                SessionError::ResponseTimeout => {
                    warn!("RPC {:?} to agent {} hit the hub-side deadline", action, agent_id);
                    DispatchError::RpcTimeout
                }
                SessionError::Disconnected => DispatchError::Disconnected,
                SessionError::Protocol(e) => {
                    warn!("RPC {:?} to agent {} failed: {}", action, agent_id, e);
                    DispatchError::Disconnected
                }
            })?;

        if let Some(error) = envelope.error {
            debug!("Agent {} returned an error envelope: {}", agent_id, error);
            return Err(DispatchError::Agent(error));
        }
        Ok(envelope)
    }

    async fn online_session(&self, agent_id: &str) -> Result<Arc<Session>, DispatchError> {
        let entry = self
            .registry
            .get(agent_id)
            .await
            .ok_or(DispatchError::AgentNotFound)?;

        if entry.status != AgentStatus::Online {
            return Err(DispatchError::AgentOffline);
        }
        entry.session.ok_or(DispatchError::AgentOffline)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, DispatchError> {
    payload::encode(value).map_err(|e| DispatchError::InvalidResponse(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, DispatchError> {
    payload::decode(bytes).map_err(|e| DispatchError::InvalidResponse(e.to_string()))
}
