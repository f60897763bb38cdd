//! Wire handlers binding the executor to the session.
//!
//! Each handler decodes its payload, delegates, and encodes the result;
//! policy lives in the executor, not here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use lookout_protocol::types::{HistoryRequest, MAX_COMMAND_TIMEOUT_SECS};
use lookout_protocol::{payload, Action, ActionHandler, HandlerRegistry};

use crate::executor::CommandExecutor;

const MAX_HISTORY_LIMIT: usize = 100;

pub fn build_registry(executor: Arc<CommandExecutor>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(
        Action::ExecuteCommand,
        Arc::new(ExecuteCommandHandler {
            executor: executor.clone(),
        }),
    );
    registry.register(
        Action::GetCommandHistory,
        Arc::new(CommandHistoryHandler { executor }),
    );
    registry.register(Action::Ping, Arc::new(PingHandler));
    registry
}

struct ExecuteCommandHandler {
    executor: Arc<CommandExecutor>,
}

#[async_trait]
impl ActionHandler for ExecuteCommandHandler {
    async fn handle(&self, request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let request = payload::decode(&request)?;
        let response = self.executor.execute(request).await;
        Ok(payload::encode(&response)?)
    }

    /// The boundary deadline sits above the largest allowed command
    /// timeout; the executor's own deadline fires first in practice.
    fn timeout(&self) -> Duration {
        Duration::from_secs(MAX_COMMAND_TIMEOUT_SECS + 10)
    }
}

struct CommandHistoryHandler {
    executor: Arc<CommandExecutor>,
}

#[async_trait]
impl ActionHandler for CommandHistoryHandler {
    async fn handle(&self, request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let request: HistoryRequest = payload::decode(&request)?;
        let history = self
            .executor
            .history(request.limit.min(MAX_HISTORY_LIMIT))
            .await;
        Ok(payload::encode(&history)?)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(10)
    }
}

struct PingHandler;

#[async_trait]
impl ActionHandler for PingHandler {
    async fn handle(&self, _request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}
