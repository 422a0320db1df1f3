//! End-to-end relay tests: a real server on a loopback port driven by real
//! WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use fair_relay_auth::{Identity, TokenAuthority};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::{AuthConfig, RelayConfig};
use crate::{AppState, app};

/// Timeout for each async operation in tests.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const SECRET: &str = "e2e-shared-secret";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the relay on 127.0.0.1:0 and return its address plus shared state.
async fn start_relay(auth_timeout: Option<Duration>) -> (SocketAddr, AppState) {
    let config = RelayConfig {
        listen_addr: ([127, 0, 0, 1], 0).into(),
        max_message_bytes: 64 * 1024,
        send_queue_capacity: 32,
        auth: AuthConfig {
            secret: SECRET.into(),
            auth_timeout,
            leeway_secs: 0,
        },
    };
    let state = AppState::new(config);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("no local addr");
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });

    (addr, state)
}

fn token_for(name: &str) -> String {
    TokenAuthority::new(SECRET.as_bytes(), 0)
        .issue(Identity::new(name), chrono::Duration::minutes(5))
        .expect("failed to mint token")
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = timeout(TEST_TIMEOUT, connect_async(format!("ws://{addr}/")))
        .await
        .expect("timed out connecting")
        .expect("handshake failed");
    client
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("send failed");
}

/// Next server text frame exactly as sent, skipping control frames.
async fn recv_text(client: &mut Client) -> String {
    loop {
        let frame = timeout(TEST_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn recv(client: &mut Client) -> Value {
    serde_json::from_str(&recv_text(client).await).expect("server sent bad JSON")
}

/// Wait for the server to close the connection, ignoring any text in flight.
async fn expect_closed(client: &mut Client) {
    loop {
        match timeout(TEST_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for close")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => continue,
        }
    }
}

/// Authenticate and return the id the relay assigned plus the roster.
async fn auth_as(client: &mut Client, name: &str) -> (String, Vec<String>) {
    send(client, json!({"kind": "auth", "token": token_for(name)})).await;
    let msg = recv(client).await;
    assert_eq!(msg["kind"], "users", "expected users, got {msg}");
    let myid = msg["myid"].as_str().expect("myid is a string").to_string();
    assert_eq!(msg["userInfos"][&myid]["name"], name);
    let users = msg["users"]
        .as_array()
        .expect("users is a list")
        .iter()
        .map(|id| id.as_str().expect("ids are strings").to_string())
        .collect();
    (myid, users)
}

fn expect_error(msg: Value, expected: &str) {
    assert_eq!(msg["kind"], "error", "expected {expected} error, got {msg}");
    assert_eq!(msg["code"], expected);
}

#[tokio::test]
async fn two_peers_negotiate_and_part() {
    let (addr, _state) = start_relay(None).await;

    let mut x = connect(addr).await;
    let (x_id, users) = auth_as(&mut x, "Alice").await;
    assert_eq!(users, vec![x_id.clone()]);

    let mut y = connect(addr).await;
    let (y_id, users) = auth_as(&mut y, "Bob").await;
    assert!(users.contains(&x_id));
    assert!(users.contains(&y_id));

    assert_eq!(
        recv(&mut x).await,
        json!({"kind": "newUser", "peerId": y_id, "userInfo": {"name": "Bob"}})
    );

    send(&mut y, json!({"kind": "ice", "to": x_id, "ice": {"candidate": null}})).await;
    assert_eq!(
        recv(&mut x).await,
        json!({"kind": "ice", "from": y_id, "ice": {"candidate": null}})
    );

    send(&mut x, json!({"kind": "offer", "to": y_id, "offer": {"sdp": "v=0"}})).await;
    assert_eq!(
        recv(&mut y).await,
        json!({"kind": "offer", "from": x_id, "offer": {"sdp": "v=0"}})
    );

    y.close(None).await.expect("close failed");
    assert_eq!(recv(&mut x).await, json!({"kind": "peerClose", "peer": y_id}));

    send(&mut x, json!({"kind": "answer", "to": y_id, "answer": {}})).await;
    expect_error(recv(&mut x).await, "peer_not_found");
}

#[tokio::test]
async fn payloads_arrive_byte_identical() {
    let (addr, _state) = start_relay(None).await;
    let mut x = connect(addr).await;
    let (x_id, _) = auth_as(&mut x, "Alice").await;
    let mut y = connect(addr).await;
    let (y_id, _) = auth_as(&mut y, "Bob").await;
    recv(&mut x).await; // newUser

    let offer = r#"{"type":"offer", "sdp":"v=0","n":123456789012345678901234}"#;
    y.send(Message::Text(
        format!(r#"{{"kind":"offer","to":"{x_id}","offer":{offer}}}"#).into(),
    ))
    .await
    .expect("send failed");
    assert_eq!(
        recv_text(&mut x).await,
        format!(r#"{{"kind":"offer","from":"{y_id}","offer":{offer}}}"#)
    );

    let ice = r#"{"x":1e400,"candidate":"candidate:0 1 UDP 2122252543 10.0.0.1 54321 typ host"}"#;
    y.send(Message::Text(
        format!(r#"{{"kind":"ice","to":"{x_id}","ice":{ice}}}"#).into(),
    ))
    .await
    .expect("send failed");
    assert_eq!(
        recv_text(&mut x).await,
        format!(r#"{{"kind":"ice","from":"{y_id}","ice":{ice}}}"#)
    );
}

#[tokio::test]
async fn protocol_errors_keep_connection_open() {
    let (addr, _state) = start_relay(None).await;
    let mut client = connect(addr).await;

    send(&mut client, json!({"kind": "dance"})).await;
    expect_error(recv(&mut client).await, "unknown_kind");

    client
        .send(Message::Text("not json".into()))
        .await
        .expect("send failed");
    expect_error(recv(&mut client).await, "invalid_json");

    client
        .send(Message::Binary(vec![1, 2, 3].into()))
        .await
        .expect("send failed");
    expect_error(recv(&mut client).await, "binary_frame");

    send(&mut client, json!({"kind": "offer", "offer": {}})).await;
    expect_error(recv(&mut client).await, "malformed_message");

    // Still usable afterwards
    auth_as(&mut client, "Alice").await;
}

#[tokio::test]
async fn unauthenticated_connection_cannot_relay() {
    let (addr, _state) = start_relay(None).await;

    let mut x = connect(addr).await;
    let (x_id, _) = auth_as(&mut x, "Alice").await;

    let mut stranger = connect(addr).await;
    send(
        &mut stranger,
        json!({"kind": "offer", "to": x_id, "offer": {"sdp": "v=0"}}),
    )
    .await;
    expect_error(recv(&mut stranger).await, "not_authenticated");
}

#[tokio::test]
async fn bad_tokens_are_rejected_and_retry_allowed() {
    let (addr, _state) = start_relay(None).await;
    let mut client = connect(addr).await;

    send(&mut client, json!({"kind": "auth", "token": "garbage"})).await;
    expect_error(recv(&mut client).await, "malformed_token");

    let forged = TokenAuthority::new(b"some-other-secret", 0)
        .issue(Identity::new("Mallory"), chrono::Duration::minutes(5))
        .unwrap();
    send(&mut client, json!({"kind": "auth", "token": forged})).await;
    expect_error(recv(&mut client).await, "invalid_signature");

    auth_as(&mut client, "Alice").await;

    send(&mut client, json!({"kind": "auth", "token": token_for("Alice")})).await;
    expect_error(recv(&mut client).await, "already_authenticated");
}

#[tokio::test]
async fn auth_timeout_closes_idle_connection() {
    let (addr, state) = start_relay(Some(Duration::from_millis(500))).await;

    let mut observer = connect(addr).await;
    let (observer_id, _) = auth_as(&mut observer, "Alice").await;

    let mut idle = connect(addr).await;
    expect_error(recv(&mut idle).await, "auth_timeout");
    expect_closed(&mut idle).await;

    let left = recv(&mut observer).await;
    assert_eq!(left["kind"], "peerClose");
    assert_ne!(left["peer"], observer_id);
    assert_eq!(state.relay.registry.ids().await, vec![observer_id]);
}

#[tokio::test]
async fn shutdown_closes_sessions() {
    let (addr, state) = start_relay(None).await;
    let mut client = connect(addr).await;
    auth_as(&mut client, "Alice").await;

    state.relay.shutdown.cancel();
    expect_closed(&mut client).await;

    timeout(TEST_TIMEOUT, async {
        while state.relay.registry.len().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never emptied");
}

#[tokio::test]
async fn health_reports_connections() {
    let (addr, _state) = start_relay(None).await;
    let mut client = connect(addr).await;
    auth_as(&mut client, "Alice").await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    timeout(TEST_TIMEOUT, stream.read_to_string(&mut response))
        .await
        .expect("timed out reading health")
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    let body = response.split("\r\n\r\n").nth(1).unwrap_or_default();
    let health: Value = serde_json::from_str(body).expect("health body is JSON");
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["authenticated"], 1);
}
