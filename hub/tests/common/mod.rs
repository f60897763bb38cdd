//! Shared fixtures: an in-process hub and scripted agents for driving it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpStream;

use lookout_hub::config::{ApiToken, HubConfig};
use lookout_hub::dispatch::CommandDispatcher;
use lookout_hub::listener::AgentListener;
use lookout_hub::registry::{AgentRegistry, AgentStatus};
use lookout_hub::web::{create_router, AppState};
use lookout_protocol::types::{
    CommandRequest, CommandResponse, HandshakeAck, HandshakeRequest, HistoryEntry, HistoryRequest,
};
use lookout_protocol::{
    payload, Action, ActionHandler, HandlerRegistry, Session, DEFAULT_MAX_FRAME_SIZE,
};

pub const TEST_API_TOKEN: &str = "test-api-token";
pub const TEST_AGENT_TOKEN: &str = "test-agent-token";

pub struct TestHub {
    pub http_base: String,
    pub agent_addr: SocketAddr,
    pub registry: Arc<AgentRegistry>,
}

pub async fn start_hub() -> TestHub {
    start_hub_with_rpc_timeout(Duration::from_secs(10)).await
}

pub async fn start_hub_with_rpc_timeout(rpc_timeout: Duration) -> TestHub {
    let config = Arc::new(HubConfig {
        http_addr: "127.0.0.1:0".to_string(),
        agent_addr: "127.0.0.1:0".to_string(),
        api_tokens: vec![ApiToken {
            label: "ops".to_string(),
            token: TEST_API_TOKEN.to_string(),
        }],
        agent_token: TEST_AGENT_TOKEN.to_string(),
    });

    let registry = Arc::new(AgentRegistry::new());
    let dispatcher = Arc::new(CommandDispatcher::with_timeout(
        registry.clone(),
        rpc_timeout,
    ));

    let listener = AgentListener::bind(config.clone(), registry.clone())
        .await
        .expect("binding agent listener");
    let agent_addr = listener.local_addr();
    tokio::spawn(listener.run());

    let state = AppState::new(config, registry.clone(), dispatcher);
    let app = create_router(state);
    let http_listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("binding http listener");
    let http_addr = http_listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(http_listener, app).await.unwrap();
    });

    TestHub {
        http_base: format!("http://{http_addr}"),
        agent_addr,
        registry,
    }
}

impl TestHub {
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.http_base)
    }

    /// Poll the registry until the agent reaches the wanted status.
    pub async fn wait_for_status(&self, agent_id: &str, status: AgentStatus) {
        for _ in 0..100 {
            if self
                .registry
                .summary(agent_id)
                .await
                .is_some_and(|summary| summary.status == status)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("agent {agent_id} never reached {status:?}");
    }
}

/// Connect a protocol-level agent with the given handlers and complete
/// the handshake. The returned session stays alive until closed.
pub async fn connect_agent(
    hub: &TestHub,
    agent_id: &str,
    handlers: HandlerRegistry,
) -> Arc<Session> {
    let stream = TcpStream::connect(hub.agent_addr)
        .await
        .expect("connecting to agent listener");
    let (session, reader) = Session::new(stream, DEFAULT_MAX_FRAME_SIZE);
    tokio::spawn(reader.run(Arc::new(handlers)));

    let hello = HandshakeRequest {
        agent_id: agent_id.to_string(),
        key: String::new(),
        token: TEST_AGENT_TOKEN.to_string(),
        version: "0.0.0-test".to_string(),
    };
    let reply = session
        .send_and_wait(
            Action::Handshake,
            payload::encode(&hello).unwrap(),
            Duration::from_secs(5),
        )
        .await
        .expect("handshake exchange");
    assert!(reply.error.is_none(), "handshake rejected: {:?}", reply.error);
    let ack: HandshakeAck = payload::decode(&reply.payload).unwrap();
    assert!(ack.accepted);

    hub.wait_for_status(agent_id, AgentStatus::Online).await;
    session
}

/// Echoes the joined args back as stdout and the rate-limit client key
/// as stderr, so tests can observe both ends of the request.
pub struct EchoCommandHandler;

#[async_trait]
impl ActionHandler for EchoCommandHandler {
    async fn handle(&self, request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let request: CommandRequest = payload::decode(&request)?;
        let response = CommandResponse {
            exit_code: 0,
            stdout: format!("{}\n", request.args.join(" ")),
            stderr: request.client_key.unwrap_or_default(),
            error: String::new(),
            duration_ms: 5,
        };
        Ok(payload::encode(&response)?)
    }
}

/// Sleeps past any short hub-side deadline before answering.
pub struct SlowCommandHandler;

#[async_trait]
impl ActionHandler for SlowCommandHandler {
    async fn handle(&self, _request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let response = CommandResponse::default();
        Ok(payload::encode(&response)?)
    }
}

pub struct FailingCommandHandler;

#[async_trait]
impl ActionHandler for FailingCommandHandler {
    async fn handle(&self, _request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("executor blew up")
    }
}

/// Returns `min(limit, 3)` canned history entries, oldest first.
pub struct CannedHistoryHandler;

#[async_trait]
impl ActionHandler for CannedHistoryHandler {
    async fn handle(&self, request: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let request: HistoryRequest = payload::decode(&request)?;
        let entries: Vec<HistoryEntry> = (0..request.limit.min(3))
            .map(|i| HistoryEntry {
                command: format!("/bin/cmd{i}"),
                args: vec![],
                started_at: Utc::now(),
                duration_ms: i as u64,
                exit_code: 0,
                workdir: None,
            })
            .collect();
        Ok(payload::encode(&entries)?)
    }
}

pub fn command_handlers() -> HandlerRegistry {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Action::ExecuteCommand, Arc::new(EchoCommandHandler));
    handlers.register(Action::GetCommandHistory, Arc::new(CannedHistoryHandler));
    handlers
}
