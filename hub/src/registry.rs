//! Registry of known agents and their live sessions.
//!
//! Status transitions are strictly offline→online on attach and
//! online→offline on detach. A reconnect replaces the previous session;
//! the old connection's late detach is ignored so it cannot knock the
//! fresh session offline.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use lookout_protocol::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

#[derive(Clone)]
pub struct AgentEntry {
    pub agent_id: String,
    pub status: AgentStatus,
    pub version: String,
    pub connected_at: Option<DateTime<Utc>>,
    pub session: Option<Arc<Session>>,
}

/// Registry snapshot safe to hand to the HTTP layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: String,
    pub status: AgentStatus,
    pub version: String,
    pub connected_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, agent_id: &str, version: String, session: Arc<Session>) {
        let previous = {
            let mut agents = self.agents.write().await;
            let previous = agents
                .get(agent_id)
                .and_then(|entry| entry.session.clone());
            agents.insert(
                agent_id.to_string(),
                AgentEntry {
                    agent_id: agent_id.to_string(),
                    status: AgentStatus::Online,
                    version,
                    connected_at: Some(Utc::now()),
                    session: Some(session),
                },
            );
            previous
        };

        if let Some(old) = previous {
            info!("Agent {} reconnected; closing its previous session", agent_id);
            old.close().await;
        }
    }

    /// Mark the agent offline, but only if `session` is still the one on
    /// record. A stale detach from a replaced connection is a no-op.
    pub async fn detach(&self, agent_id: &str, session: &Arc<Session>) {
        let mut agents = self.agents.write().await;
        if let Some(entry) = agents.get_mut(agent_id) {
            let is_current = entry
                .session
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, session));
            if is_current {
                entry.status = AgentStatus::Offline;
                entry.session = None;
            }
        }
    }

    pub async fn get(&self, agent_id: &str) -> Option<AgentEntry> {
        self.agents.read().await.get(agent_id).cloned()
    }

    pub async fn summary(&self, agent_id: &str) -> Option<AgentSummary> {
        self.agents.read().await.get(agent_id).map(summarize)
    }

    pub async fn list(&self) -> Vec<AgentSummary> {
        let mut summaries: Vec<_> = self.agents.read().await.values().map(summarize).collect();
        summaries.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        summaries
    }
}

fn summarize(entry: &AgentEntry) -> AgentSummary {
    AgentSummary {
        agent_id: entry.agent_id.clone(),
        status: entry.status,
        version: entry.version.clone(),
        connected_at: entry.connected_at,
    }
}
