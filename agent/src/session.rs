//! Hub connection lifecycle: connect, handshake, serve, reconnect.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;
use tracing::{info, warn};

use lookout_protocol::types::{HandshakeAck, HandshakeRequest};
use lookout_protocol::{payload, Action, HandlerRegistry, Session, DEFAULT_MAX_FRAME_SIZE};

use crate::config::AgentConfig;

const RECONNECT_MIN: Duration = Duration::from_secs(2);
const RECONNECT_MAX: Duration = Duration::from_secs(60);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keep a session to the hub alive forever. Backoff doubles from 2 s up
/// to 60 s across failed attempts and resets after any connection that
/// got past the handshake.
pub async fn run(config: AgentConfig, handlers: Arc<HandlerRegistry>) -> Result<()> {
    let mut backoff = RECONNECT_MIN;
    loop {
        match serve_connection(&config, handlers.clone()).await {
            Ok(()) => {
                info!("Hub connection closed");
                backoff = RECONNECT_MIN;
            }
            Err(e) => {
                warn!("Hub connection failed: {e:#}");
            }
        }

        info!("Reconnecting to hub in {}s", backoff.as_secs());
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(RECONNECT_MAX);
    }
}

/// One connection: dial, handshake, then serve inbound requests until
/// the hub goes away. Returns Ok only if the handshake succeeded.
async fn serve_connection(config: &AgentConfig, handlers: Arc<HandlerRegistry>) -> Result<()> {
    let stream = TcpStream::connect(&config.hub_addr)
        .await
        .with_context(|| format!("connecting to hub at {}", config.hub_addr))?;

    let (session, reader) = Session::new(stream, DEFAULT_MAX_FRAME_SIZE);
    let reader_task = tokio::spawn(reader.run(handlers));

    match handshake(config, &session).await {
        Ok(ack) => {
            info!(
                "Connected to hub {} as {} (hub version {})",
                config.hub_addr, config.agent_id, ack.hub_version
            );
        }
        Err(e) => {
            session.close().await;
            reader_task.abort();
            return Err(e);
        }
    }

    // Serve until the connection drops; the reader closes the session on
    // the way out.
    let _ = reader_task.await;
    Ok(())
}

async fn handshake(config: &AgentConfig, session: &Session) -> Result<HandshakeAck> {
    let hello = HandshakeRequest {
        agent_id: config.agent_id.clone(),
        key: config.key.clone(),
        token: config.token.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let reply = session
        .send_and_wait(Action::Handshake, payload::encode(&hello)?, HANDSHAKE_TIMEOUT)
        .await
        .context("handshake exchange failed")?;

    if let Some(error) = reply.error {
        bail!("hub rejected handshake: {error}");
    }

    let ack: HandshakeAck = payload::decode(&reply.payload)?;
    if !ack.accepted {
        bail!("hub refused the connection");
    }
    Ok(ack)
}
