//! Integration tests for WebSocket session events.
//!
//! These tests validate connection handling, phase broadcasts triggered by
//! HTTP requests, and concurrent client support.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::SinkExt;
use futures::StreamExt;
use snapsolve_tutor::{
    create_router, AnalysisError, AnalysisResult, Analyzer, AppState, Config, ImageData,
    PhaseKind, SessionEvent,
};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

const PNG_DATA_URL: &str = "data:image/png;base64,iVBORw0KGgo=";

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Spawns the test server and returns its address.
async fn spawn_test_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, handle)
}

/// Connects a WebSocket client to the server.
async fn connect_client(addr: &str) -> WsClient {
    let (ws_stream, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message from the WebSocket and parses it as a
/// `SessionEvent`. Ping frames are answered with pong.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
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

/// Receives the next event and returns its `(from, to)` phases.
async fn receive_transition(client: &mut WsClient) -> (PhaseKind, PhaseKind) {
    match receive_event(client).await {
        SessionEvent::PhaseChanged(payload) => {
            assert_eq!(payload.session.kind(), payload.to);
            (payload.from, payload.to)
        }
        other => panic!("Expected phase_changed event, got: {other:?}"),
    }
}

async fn post_submit(addr: &str) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/session/submit"))
        .json(&serde_json::json!({ "imageData": PNG_DATA_URL }))
        .send()
        .await
        .expect("Failed to submit")
        .status()
}

async fn post_reset(addr: &str) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(format!("http://{addr}/api/session/reset"))
        .send()
        .await
        .expect("Failed to reset")
        .status()
}

/// Analyzer that holds every call until released, then succeeds.
struct GatedAnalyzer {
    gate: Arc<Notify>,
}

#[async_trait]
impl Analyzer for GatedAnalyzer {
    async fn analyze(&self, _image: &ImageData) -> Result<AnalysisResult, AnalysisError> {
        self.gate.notified().await;
        Ok(AnalysisResult {
            subject: "Physics".to_string(),
            topic: "Kinematics".to_string(),
            emoji: "🚀".to_string(),
            steps: vec!["Write v = d / t".to_string()],
            explanation: "Speed is distance over time.".to_string(),
            practice_questions: Vec::new(),
        })
    }
}

fn gated_state() -> (AppState, Arc<Notify>) {
    let gate = Arc::new(Notify::new());
    let analyzer = Arc::new(GatedAnalyzer { gate: gate.clone() });
    (AppState::new(Config::default(), analyzer), gate)
}

// ============================================================================
// Connection Tests
// ============================================================================

/// Tests that a client receives the home session on connection.
#[tokio::test]
async fn test_client_receives_connected_event_on_connect() {
    let (state, _gate) = gated_state();
    let (addr, _handle) = spawn_test_server(state).await;

    let mut client = connect_client(&addr).await;
    let event = receive_event(&mut client).await;

    match event {
        SessionEvent::Connected(payload) => {
            assert_eq!(payload.session.kind(), PhaseKind::Home);
            assert_eq!(payload.session.submissions(), 0);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

/// Tests that a client connecting mid-analysis sees the analyzing phase.
#[tokio::test]
async fn test_connected_event_contains_current_phase() {
    let (state, gate) = gated_state();
    let (addr, _handle) = spawn_test_server(state).await;

    assert_eq!(post_submit(&addr).await, reqwest::StatusCode::ACCEPTED);

    let mut client = connect_client(&addr).await;
    match receive_event(&mut client).await {
        SessionEvent::Connected(payload) => {
            assert_eq!(payload.session.kind(), PhaseKind::Analyzing);
            assert_eq!(payload.session.submissions(), 1);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }

    gate.notify_one();
    assert_eq!(
        receive_transition(&mut client).await,
        (PhaseKind::Analyzing, PhaseKind::Success)
    );
}

// ============================================================================
// Phase Broadcast Tests
// ============================================================================

/// Tests that a submission produces analyzing then success, in order.
#[tokio::test]
async fn test_submit_broadcasts_phase_changes_in_order() {
    let (state, gate) = gated_state();
    let (addr, _handle) = spawn_test_server(state).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    assert_eq!(post_submit(&addr).await, reqwest::StatusCode::ACCEPTED);
    assert_eq!(
        receive_transition(&mut client).await,
        (PhaseKind::Home, PhaseKind::Analyzing)
    );

    gate.notify_one();
    match receive_event(&mut client).await {
        SessionEvent::PhaseChanged(payload) => {
            assert_eq!(payload.from, PhaseKind::Analyzing);
            assert_eq!(payload.to, PhaseKind::Success);
            let result = payload.session.result().expect("Success carries a result");
            assert_eq!(result.topic, "Kinematics");
            assert_eq!(
                payload
                    .session
                    .image()
                    .expect("Image is attached")
                    .media_type(),
                "image/png"
            );
        }
        other => panic!("Expected phase_changed event, got: {other:?}"),
    }
}

/// Tests that events are broadcast to all connected clients.
#[tokio::test]
async fn test_events_broadcast_to_all_clients() {
    let (state, gate) = gated_state();
    let (addr, _handle) = spawn_test_server(state).await;

    let mut clients = vec![
        connect_client(&addr).await,
        connect_client(&addr).await,
        connect_client(&addr).await,
    ];
    for client in &mut clients {
        assert!(matches!(
            receive_event(client).await,
            SessionEvent::Connected(_)
        ));
    }

    post_submit(&addr).await;
    gate.notify_one();

    for client in &mut clients {
        assert_eq!(
            receive_transition(client).await,
            (PhaseKind::Home, PhaseKind::Analyzing)
        );
        assert_eq!(
            receive_transition(client).await,
            (PhaseKind::Analyzing, PhaseKind::Success)
        );
    }
}

/// Tests that reset broadcasts the return to home.
#[tokio::test]
async fn test_reset_broadcasts_return_home() {
    let (state, gate) = gated_state();
    let (addr, _handle) = spawn_test_server(state).await;

    let mut client = connect_client(&addr).await;
    receive_event(&mut client).await;

    post_submit(&addr).await;
    gate.notify_one();
    receive_transition(&mut client).await;
    receive_transition(&mut client).await;

    assert_eq!(post_reset(&addr).await, reqwest::StatusCode::OK);
    match receive_event(&mut client).await {
        SessionEvent::PhaseChanged(payload) => {
            assert_eq!(payload.from, PhaseKind::Success);
            assert_eq!(payload.to, PhaseKind::Home);
            assert!(payload.session.image().is_none());
            assert!(payload.session.result().is_none());
        }
        other => panic!("Expected phase_changed event, got: {other:?}"),
    }
}

// ============================================================================
// Disconnect Tests
// ============================================================================

/// Tests that the server keeps broadcasting after a client disconnects.
#[tokio::test]
async fn test_client_disconnect_handled_gracefully() {
    let (state, gate) = gated_state();
    let (addr, _handle) = spawn_test_server(state).await;

    let mut leaving = connect_client(&addr).await;
    let mut staying = connect_client(&addr).await;
    receive_event(&mut leaving).await;
    receive_event(&mut staying).await;

    leaving.close(None).await.expect("Failed to close");
    drop(leaving);
    tokio::time::sleep(Duration::from_millis(50)).await;

    post_submit(&addr).await;
    gate.notify_one();

    assert_eq!(
        receive_transition(&mut staying).await,
        (PhaseKind::Home, PhaseKind::Analyzing)
    );
    assert_eq!(
        receive_transition(&mut staying).await,
        (PhaseKind::Analyzing, PhaseKind::Success)
    );
}
