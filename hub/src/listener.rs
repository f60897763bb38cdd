//! Persistent agent connections: accept, handshake, attach, serve.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{info, warn};

use lookout_protocol::types::{HandshakeAck, HandshakeRequest};
use lookout_protocol::{payload, Action, Envelope, FrameCodec, HandlerRegistry, Session};

use crate::config::HubConfig;
use crate::registry::AgentRegistry;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AgentListener {
    config: Arc<HubConfig>,
    registry: Arc<AgentRegistry>,
    /// Handlers for agent-initiated requests. Command traffic flows the
    /// other way; telemetry actions would register here.
    handlers: Arc<HandlerRegistry>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl AgentListener {
    pub async fn bind(config: Arc<HubConfig>, registry: Arc<AgentRegistry>) -> Result<Self> {
        let listener = TcpListener::bind(&config.agent_addr)
            .await
            .with_context(|| format!("binding agent listener on {}", config.agent_addr))?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            config,
            registry,
            handlers: Arc::new(HandlerRegistry::new()),
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn run(self) -> Result<()> {
        info!("Agent listener running on {}", self.local_addr);
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let config = self.config.clone();
            let registry = self.registry.clone();
            let handlers = self.handlers.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_agent(stream, peer, config, registry, handlers).await {
                    warn!("Agent connection from {} ended: {e:#}", peer);
                }
            });
        }
    }
}

/// Drive one agent connection from handshake to disconnect.
async fn serve_agent(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<HubConfig>,
    registry: Arc<AgentRegistry>,
    handlers: Arc<HandlerRegistry>,
) -> Result<()> {
    let mut framed = Framed::new(stream, FrameCodec::new());
    let hello = read_handshake(&mut framed, &config).await?;

    let (session, reader) = Session::from_framed(framed, peer.to_string());
    registry
        .attach(&hello.agent_id, hello.version.clone(), session.clone())
        .await;
    info!(
        "Agent {} connected from {} (version {})",
        hello.agent_id, peer, hello.version
    );

    tokio::select! {
        _ = reader.run(handlers) => {}
        _ = ping_loop(session.clone()) => {}
    }

    session.close().await;
    registry.detach(&hello.agent_id, &session).await;
    info!("Agent {} disconnected", hello.agent_id);
    Ok(())
}

/// The first envelope must be a valid, authenticated handshake; anything
/// else drops the connection. On success the acknowledgement is written
/// before the session takes over the transport.
async fn read_handshake(
    framed: &mut Framed<TcpStream, FrameCodec>,
    config: &HubConfig,
) -> Result<HandshakeRequest> {
    let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, framed.next())
        .await
        .map_err(|_| anyhow!("handshake timed out"))?
        .ok_or_else(|| anyhow!("connection closed before handshake"))?
        .context("reading handshake")?;

    let envelope = Envelope::decode(&frame).context("decoding handshake")?;
    if envelope.is_response() || envelope.action != Action::Handshake {
        bail!("first envelope was not a handshake request");
    }

    let hello: HandshakeRequest =
        payload::decode(&envelope.payload).context("decoding handshake payload")?;

    if hello.token != config.agent_token {
        let reply =
            Envelope::error_response(envelope.id, Action::Handshake, "invalid credentials".into());
        framed.send(reply.encode()?).await?;
        bail!("agent {} presented invalid credentials", hello.agent_id);
    }

    let ack = HandshakeAck {
        accepted: true,
        hub_version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let reply = Envelope::response(envelope.id, Action::Handshake, payload::encode(&ack)?);
    framed.send(reply.encode()?).await?;

    Ok(hello)
}

/// Probe the agent until it stops answering, then let the connection be
/// torn down.
async fn ping_loop(session: Arc<Session>) {
    let mut interval = tokio::time::interval(PING_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        if session
            .send_and_wait(Action::Ping, Vec::new(), PING_TIMEOUT)
            .await
            .is_err()
        {
            warn!("Agent at {} stopped answering pings", session.peer());
            break;
        }
    }
}
