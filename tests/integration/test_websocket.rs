//! Integration tests for the HTTP API and WebSocket event stream.
//!
//! These tests run a real server on a local port and drive a session the way
//! a presentation layer would: REST calls in, events out over `/ws`.

mod common;

use std::net::TcpListener;
use std::time::Duration;

use common::{start_session, ScriptedBackend};
use futures::{SinkExt, StreamExt};
use mockview_engine::{create_router, AppState, InterviewSession};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawns the test server and returns its base address.
async fn spawn_test_server(session: InterviewSession) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = create_router(AppState::new(session));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, handle)
}

async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next event as JSON, answering pings along the way.
async fn receive_event(client: &mut WsClient) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Receives events until one named `name` arrives.
async fn receive_until(client: &mut WsClient, name: &str) -> Value {
    loop {
        let event = receive_event(client).await;
        if event["event"] == name {
            return event;
        }
    }
}

/// Tests that a client receives the session snapshot on connect.
#[tokio::test]
async fn test_connected_event_contains_snapshot() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    let (addr, _handle) = spawn_test_server(session).await;

    let mut client = connect_client(&addr).await;
    let event = receive_event(&mut client).await;

    assert_eq!(event["event"], "connected");
    let snapshot = &event["payload"]["session"];
    assert_eq!(snapshot["sessionId"], "session-1");
    assert_eq!(snapshot["stage"], "intro");
    assert_eq!(snapshot["transcript"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["maxAttempts"], 3);
}

/// Tests that an answer posted over HTTP is streamed to every client.
#[tokio::test]
async fn test_answer_events_broadcast_to_all_clients() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    let (addr, _handle) = spawn_test_server(session).await;

    let mut client1 = connect_client(&addr).await;
    let mut client2 = connect_client(&addr).await;
    receive_event(&mut client1).await;
    receive_event(&mut client2).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/session/answer"))
        .json(&json!({ "text": "I enjoy debugging production issues." }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "replied");

    for client in [&mut client1, &mut client2] {
        let event = receive_until(client, "message_appended").await;
        assert_eq!(event["payload"]["index"], 1);
        assert_eq!(event["payload"]["message"]["sender"], "user");

        let event = receive_until(client, "feedback_attached").await;
        assert_eq!(event["payload"]["index"], 1);
        assert_eq!(event["payload"]["feedback"]["suggestion"], "Mention a metric.");

        let event = receive_until(client, "message_appended").await;
        assert_eq!(event["payload"]["message"]["sender"], "ai");
    }
}

/// Tests the end endpoint and the `session_ended` event.
#[tokio::test]
async fn test_end_over_http_streams_session_ended() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    let (addr, _handle) = spawn_test_server(session).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    let http = reqwest::Client::new();
    let response = http
        .post(format!("http://{addr}/api/session/end"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ended"], true);

    let event = receive_until(&mut client, "session_ended").await;
    assert_eq!(event["payload"]["reason"], "explicit");
    assert_eq!(
        event["payload"]["reportUrl"],
        "https://reports.test/session-1.txt"
    );

    let response = http
        .post(format!("http://{addr}/api/session/answer"))
        .json(&json!({ "text": "Still there?" }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["reason"], "session_ended");
    assert_eq!(backend.uploads.lock().unwrap().len(), 1);
}
