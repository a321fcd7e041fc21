//! Integration tests for the WebSocket console server.
//!
//! These run a real server on a loopback port and drive it with a real
//! WebSocket client, covering upgrade acceptance, the authentication state
//! machine and broadcast delivery.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use admon_core::DocKey;
use admond::admin::{spawn_admin, AdminHandle};
use admond::config::Credentials;
use admond::sampler::SystemProbe;
use admond::server::AdminServer;

/// Sampling cadence long enough that no tick fires during a test.
const IDLE_INTERVAL: Duration = Duration::from_secs(3600);

/// How long to wait for an expected frame.
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Running server plus the handles a test needs to drive it.
struct TestServer {
    addr: std::net::SocketAddr,
    admin: AdminHandle,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        let admin = spawn_admin(
            IDLE_INTERVAL,
            IDLE_INTERVAL,
            100,
            Box::new(SystemProbe::new()),
        );
        let cancel_token = CancellationToken::new();

        let server = AdminServer::bind(
            "127.0.0.1:0",
            admin.clone(),
            Credentials::new("admin", "s3cret"),
            cancel_token.clone(),
        )
        .await
        .expect("bind console server");

        let addr = server.local_addr();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            admin,
            cancel_token,
        }
    }

    /// Opens a WebSocket connection to the admin endpoint.
    async fn connect(&self) -> ClientStream {
        let url = format!("ws://{}/adminws", self.addr);
        let (ws, _response) = connect_async(url).await.expect("connect to admin endpoint");
        ws
    }

    /// Connects and authenticates, draining the initial snapshot.
    async fn connect_authenticated(&self) -> ClientStream {
        let mut ws = self.connect().await;
        ws.send(Message::text("auth admin s3cret")).await.unwrap();

        // Initial snapshot: settings, documents, stats history.
        for expected in ["settings", "documents", "stats_history"] {
            let text = recv_text(&mut ws).await;
            assert!(
                text.contains(&format!("\"type\":\"{expected}\"")),
                "expected {expected} frame, got: {text}"
            );
        }

        ws
    }

    fn shutdown(self) {
        self.cancel_token.cancel();
    }
}

/// Reads frames until a text frame arrives.
async fn recv_text(ws: &mut ClientStream) -> String {
    loop {
        let frame = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed while expecting text")
            .expect("read error while expecting text");

        match frame {
            Message::Text(text) => return text.as_str().to_string(),
            // Transport-level traffic is not what we're asserting on
            _ => continue,
        }
    }
}

/// Reads until the server closes the connection; fails on any text frame.
async fn expect_closed(ws: &mut ClientStream) {
    loop {
        match timeout(RECV_TIMEOUT, ws.next()).await.expect("timed out waiting for close") {
            None => return,
            Some(Ok(Message::Close(_))) => return,
            Some(Ok(Message::Text(text))) => panic!("expected close, got text: {text}"),
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    }
}

// ============================================================================
// Upgrade acceptance
// ============================================================================

#[tokio::test]
async fn test_upgrade_rejected_outside_admin_endpoint() {
    let server = TestServer::spawn().await;

    let url = format!("ws://{}/documents", server.addr);
    let result = connect_async(url).await;
    assert!(result.is_err(), "upgrade outside the admin endpoint must fail");

    server.shutdown();
}

#[tokio::test]
async fn test_upgrade_accepted_on_admin_endpoint() {
    let server = TestServer::spawn().await;

    let _ws = server.connect().await;

    server.shutdown();
}

// ============================================================================
// Authentication state machine
// ============================================================================

#[tokio::test]
async fn test_valid_credentials_receive_initial_snapshot() {
    let server = TestServer::spawn().await;

    let _ws = server.connect_authenticated().await;

    server.shutdown();
}

#[tokio::test]
async fn test_command_before_auth_closes_connection() {
    let server = TestServer::spawn().await;

    // connect -> send command -> assert closed, per the no-partial-trust rule.
    let mut ws = server.connect().await;
    ws.send(Message::text("documents")).await.unwrap();
    expect_closed(&mut ws).await;

    server.shutdown();
}

#[tokio::test]
async fn test_invalid_credentials_get_generic_error_then_close() {
    let server = TestServer::spawn().await;

    let mut ws = server.connect().await;
    ws.send(Message::text("auth admin wrong")).await.unwrap();

    let text = recv_text(&mut ws).await;
    assert!(
        text.contains("authentication failed"),
        "error must stay generic: {text}"
    );
    assert!(
        !text.contains("secret") && !text.contains("username"),
        "error must not leak which credential half failed: {text}"
    );
    expect_closed(&mut ws).await;

    server.shutdown();
}

#[tokio::test]
async fn test_rejected_console_never_receives_broadcasts() {
    let server = TestServer::spawn().await;

    let mut ws = server.connect().await;
    ws.send(Message::text("auth admin wrong")).await.unwrap();
    let _ = recv_text(&mut ws).await;
    expect_closed(&mut ws).await;

    // A registry change after the rejection reaches nobody; in particular
    // it must not resurrect the closed connection.
    server
        .admin
        .add_doc(DocKey::new("doc1"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();

    server.shutdown();
}

// ============================================================================
// Authenticated traffic
// ============================================================================

#[tokio::test]
async fn test_authenticated_console_receives_registry_broadcasts() {
    let server = TestServer::spawn().await;
    let mut ws = server.connect_authenticated().await;

    server
        .admin
        .add_doc(DocKey::new("doc1"), 100, "report.odt", "s-1", "alice")
        .await
        .unwrap();

    let text = recv_text(&mut ws).await;
    assert!(text.contains("\"type\":\"documents\""), "got: {text}");
    assert!(text.contains("doc1"), "got: {text}");
    assert!(text.contains("report.odt"), "got: {text}");

    server.shutdown();
}

#[tokio::test]
async fn test_commands_flow_through_update_dispatch() {
    let server = TestServer::spawn().await;
    let mut ws = server.connect_authenticated().await;

    ws.send(Message::text("active_docs_count")).await.unwrap();
    let text = recv_text(&mut ws).await;
    assert!(text.contains("\"type\":\"doc_count\""), "got: {text}");
    assert!(text.contains("\"count\":0"), "got: {text}");

    server.shutdown();
}

#[tokio::test]
async fn test_unknown_command_keeps_connection_open() {
    let server = TestServer::spawn().await;
    let mut ws = server.connect_authenticated().await;

    ws.send(Message::text("make-coffee")).await.unwrap();

    // Still attached: the next real query answers normally.
    ws.send(Message::text("documents")).await.unwrap();
    let text = recv_text(&mut ws).await;
    assert!(text.contains("\"type\":\"documents\""), "got: {text}");

    server.shutdown();
}

#[tokio::test]
async fn test_two_consoles_see_the_same_update_order() {
    let server = TestServer::spawn().await;
    let mut first = server.connect_authenticated().await;
    let mut second = server.connect_authenticated().await;

    server
        .admin
        .add_doc(DocKey::new("doc-a"), 100, "a.odt", "s-1", "alice")
        .await
        .unwrap();
    server
        .admin
        .add_doc(DocKey::new("doc-b"), 200, "b.odt", "s-2", "bob")
        .await
        .unwrap();

    for ws in [&mut first, &mut second] {
        let update1 = recv_text(ws).await;
        assert!(update1.contains("doc-a") && !update1.contains("doc-b"), "got: {update1}");
        let update2 = recv_text(ws).await;
        assert!(update2.contains("doc-a") && update2.contains("doc-b"), "got: {update2}");
    }

    server.shutdown();
}
