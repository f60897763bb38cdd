//! Session behavior over real TCP sockets: correlation, concurrency,
//! timeouts, and disconnect handling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};

use lookout_protocol::{
    Action, ActionHandler, HandlerRegistry, Session, SessionError, DEFAULT_MAX_FRAME_SIZE,
};

struct EchoHandler;

#[async_trait]
impl ActionHandler for EchoHandler {
    async fn handle(&self, payload: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        Ok(payload)
    }
}

/// Sleeps for the number of milliseconds given in the payload, then
/// echoes it back. Lets tests control response ordering.
struct SleepyHandler;

#[async_trait]
impl ActionHandler for SleepyHandler {
    async fn handle(&self, payload: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let millis = u64::from(payload.first().copied().unwrap_or(0));
        tokio::time::sleep(Duration::from_millis(millis * 10)).await;
        Ok(payload)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

struct FailingHandler;

#[async_trait]
impl ActionHandler for FailingHandler {
    async fn handle(&self, _payload: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("handler exploded")
    }
}

/// Connect a client session to a freshly-spawned server session whose
/// reader runs the given registry. Returns the client session.
async fn connect_pair(server_handlers: HandlerRegistry) -> Arc<Session> {
    connect_pair_with_frame_sizes(server_handlers, DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_FRAME_SIZE)
        .await
}

async fn connect_pair_with_frame_sizes(
    server_handlers: HandlerRegistry,
    server_max_frame: usize,
    client_max_frame: usize,
) -> Arc<Session> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handlers = Arc::new(server_handlers);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (_session, reader) = Session::new(stream, server_max_frame);
        reader.run(handlers).await;
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (session, reader) = Session::new(stream, client_max_frame);
    tokio::spawn(reader.run(Arc::new(HandlerRegistry::new())));
    session
}

#[tokio::test]
async fn request_resolves_with_matching_response() {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Action::Ping, Arc::new(EchoHandler));
    let session = connect_pair(handlers).await;

    let response = session
        .send_and_wait(Action::Ping, b"hello".to_vec(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.payload, b"hello");
    assert!(response.error.is_none());
    assert!(response.is_response());
}

#[tokio::test]
async fn concurrent_requests_resolve_out_of_order() {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Action::Ping, Arc::new(SleepyHandler));
    let session = connect_pair(handlers).await;

    // The slow request goes out first; the fast one must not wait for it.
    let slow = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .send_and_wait(Action::Ping, vec![20], Duration::from_secs(5))
                .await
        })
    };
    let fast = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .send_and_wait(Action::Ping, vec![0], Duration::from_secs(5))
                .await
        })
    };

    let fast = fast.await.unwrap().unwrap();
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(fast.payload, vec![0]);
    assert_eq!(slow.payload, vec![20]);
}

#[tokio::test]
async fn timeout_abandons_waiter_and_session_survives() {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Action::Ping, Arc::new(SleepyHandler));
    let session = connect_pair(handlers).await;

    // 50 * 10ms handler sleep against a 50ms caller deadline.
    let result = session
        .send_and_wait(Action::Ping, vec![50], Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(SessionError::ResponseTimeout)));

    // The late response for the abandoned id must be dropped without
    // disturbing later requests on the same session.
    let response = session
        .send_and_wait(Action::Ping, vec![0], Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(response.payload, vec![0]);
}

#[tokio::test]
async fn close_fails_pending_waiters() {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Action::Ping, Arc::new(SleepyHandler));
    let session = connect_pair(handlers).await;

    let pending = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .send_and_wait(Action::Ping, vec![100], Duration::from_secs(30))
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    session.close().await;

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(SessionError::Disconnected)));
    assert!(!session.is_connected());

    // Close is idempotent and later sends fail fast.
    session.close().await;
    let result = session
        .send_and_wait(Action::Ping, vec![0], Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(SessionError::Disconnected)));
}

#[tokio::test]
async fn unknown_action_yields_error_envelope() {
    // Registry with nothing registered.
    let session = connect_pair(HandlerRegistry::new()).await;

    let response = session
        .send_and_wait(Action::ExecuteCommand, vec![], Duration::from_secs(5))
        .await
        .unwrap();

    let error = response.error.expect("expected an error envelope");
    assert!(error.contains("unknown action"), "got: {error}");
}

#[tokio::test]
async fn handler_failure_becomes_error_envelope() {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Action::Ping, Arc::new(FailingHandler));
    let session = connect_pair(handlers).await;

    let response = session
        .send_and_wait(Action::Ping, vec![], Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.error.as_deref(), Some("handler exploded"));
}

#[tokio::test]
async fn oversize_frame_terminates_session() {
    let mut handlers = HandlerRegistry::new();
    handlers.register(Action::Ping, Arc::new(EchoHandler));
    // Server accepts at most 1 KiB per frame; the client will send more.
    let session = connect_pair_with_frame_sizes(handlers, 1024, DEFAULT_MAX_FRAME_SIZE).await;

    let result = session
        .send_and_wait(Action::Ping, vec![0u8; 64 * 1024], Duration::from_secs(5))
        .await;

    // The server kills the connection, so the waiter resolves with a
    // disconnect rather than a response.
    assert!(matches!(result, Err(SessionError::Disconnected)));
}
