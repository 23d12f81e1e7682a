//! End-to-end tests for the submit → analyze → result/error flow.
//!
//! The server runs on a real TCP listener and is driven over HTTP. The
//! analysis service is replaced by scripted analyzers so the tests do not
//! need network access or an API key.

use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use snapsolve_tutor::{
    create_router, read_image, AnalysisError, AnalysisResult, Analyzer, AppState, Config,
    ImageData, ImageSource, PhaseKind, PracticeQuestion, ServiceErrorKind, Session,
    ANALYSIS_FAILED_MESSAGE, READ_FAILED_MESSAGE,
};

/// Path to the test fixtures.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the test server and returns its base URL.
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

    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://{addr}"), handle)
}

// ============================================================================
// Scripted analyzers
// ============================================================================

/// What the analyzer does on each call, in order. The last entry repeats.
#[derive(Clone, Copy)]
enum Step {
    Succeed,
    Transport,
    Empty,
}

struct ScriptedAnalyzer {
    script: Vec<Step>,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for ScriptedAnalyzer {
    async fn analyze(&self, image: &ImageData) -> Result<AnalysisResult, AnalysisError> {
        assert!(image.media_type().starts_with("image/"));

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(Step::Succeed);

        match step {
            Step::Succeed => Ok(algebra_result()),
            Step::Transport => Err(AnalysisError::service(
                ServiceErrorKind::Network,
                "error sending request: connection refused",
            )),
            Step::Empty => Err(AnalysisError::EmptyResponse),
        }
    }
}

fn algebra_result() -> AnalysisResult {
    AnalysisResult {
        subject: "Math".to_string(),
        topic: "Linear Equations".to_string(),
        emoji: "📐".to_string(),
        steps: vec!["Isolate x".to_string(), "Divide both sides".to_string()],
        explanation: "To solve for x, undo each operation applied to it.".to_string(),
        practice_questions: vec![
            PracticeQuestion {
                question: "Solve 2x=4".to_string(),
                answer: "x=2".to_string(),
                hint: Some("divide by 2".to_string()),
            },
            PracticeQuestion {
                question: "Solve 3x=12".to_string(),
                answer: "x=4".to_string(),
                hint: Some("divide by 3".to_string()),
            },
            PracticeQuestion {
                question: "Solve x-5=1".to_string(),
                answer: "x=6".to_string(),
                hint: Some("add 5".to_string()),
            },
        ],
    }
}

// ============================================================================
// HTTP helpers
// ============================================================================

fn algebra_png() -> Vec<u8> {
    std::fs::read(fixture_path().join("algebra.png")).expect("Failed to read fixture")
}

fn algebra_data_url() -> String {
    format!(
        "data:image/png;base64,{}",
        BASE64_STANDARD.encode(algebra_png())
    )
}

async fn submit(client: &reqwest::Client, base: &str) -> reqwest::Response {
    client
        .post(format!("{base}/api/session/submit"))
        .json(&serde_json::json!({ "imageData": algebra_data_url() }))
        .send()
        .await
        .expect("Failed to send submit request")
}

async fn get_session(client: &reqwest::Client, base: &str) -> Session {
    client
        .get(format!("{base}/api/session"))
        .send()
        .await
        .expect("Failed to fetch session")
        .json()
        .await
        .expect("Failed to parse session")
}

/// Polls the session until it leaves `Analyzing`.
async fn wait_until_settled(client: &reqwest::Client, base: &str) -> Session {
    for _ in 0..100 {
        let session = get_session(client, base).await;
        if session.kind() != PhaseKind::Analyzing {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Session did not leave analyzing");
}

// ============================================================================
// Scenarios
// ============================================================================

/// A well-formed analysis ends in success with the result unchanged.
#[tokio::test]
async fn test_submit_reaches_success() {
    let analyzer = ScriptedAnalyzer::new(vec![Step::Succeed]);
    let state = AppState::new(Config::default(), analyzer.clone());
    let (base, _handle) = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    let response = submit(&client, &base).await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    let accepted: Session = response.json().await.expect("Failed to parse session");
    assert_eq!(accepted.kind(), PhaseKind::Analyzing);

    let session = wait_until_settled(&client, &base).await;
    assert_eq!(session.kind(), PhaseKind::Success);
    assert_eq!(session.result(), Some(&algebra_result()));
    assert!(session.error_message().is_none());
    assert_eq!(analyzer.calls(), 1);
}

/// A transport failure ends in the generic analysis message.
#[tokio::test]
async fn test_transport_error_reaches_error() {
    let state = AppState::new(
        Config::default(),
        ScriptedAnalyzer::new(vec![Step::Transport]),
    );
    let (base, _handle) = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    submit(&client, &base).await;
    let session = wait_until_settled(&client, &base).await;

    assert_eq!(session.kind(), PhaseKind::Error);
    assert_eq!(session.error_message(), Some(ANALYSIS_FAILED_MESSAGE));
    assert!(session.result().is_none());
}

/// An empty service response ends in error.
#[tokio::test]
async fn test_empty_response_reaches_error() {
    let state = AppState::new(Config::default(), ScriptedAnalyzer::new(vec![Step::Empty]));
    let (base, _handle) = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    submit(&client, &base).await;
    let session = wait_until_settled(&client, &base).await;

    assert_eq!(session.kind(), PhaseKind::Error);
    assert_eq!(session.error_message(), Some(ANALYSIS_FAILED_MESSAGE));
}

/// After an error, reset returns home and the next submission proceeds.
#[tokio::test]
async fn test_reset_after_error_allows_resubmit() {
    let analyzer = ScriptedAnalyzer::new(vec![Step::Transport, Step::Succeed]);
    let state = AppState::new(Config::default(), analyzer.clone());
    let (base, _handle) = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    submit(&client, &base).await;
    assert_eq!(
        wait_until_settled(&client, &base).await.kind(),
        PhaseKind::Error
    );

    // Error is terminal: a second submit needs a reset first
    let response = submit(&client, &base).await;
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

    let response = client
        .post(format!("{base}/api/session/reset"))
        .send()
        .await
        .expect("Failed to reset");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let session: Session = response.json().await.expect("Failed to parse session");
    assert_eq!(session.kind(), PhaseKind::Home);
    assert!(session.image().is_none());
    assert!(session.result().is_none());
    assert!(session.error_message().is_none());

    let response = submit(&client, &base).await;
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let session = wait_until_settled(&client, &base).await;
    assert_eq!(session.kind(), PhaseKind::Success);
    assert_eq!(session.submissions(), 2);
    assert_eq!(analyzer.calls(), 2);
}

/// Raw image bytes are accepted and served back unchanged.
#[tokio::test]
async fn test_raw_upload_and_image_download() {
    let state = AppState::new(Config::default(), ScriptedAnalyzer::new(vec![Step::Succeed]));
    let (base, _handle) = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/session/submit"))
        .header("content-type", "image/png")
        .body(algebra_png())
        .send()
        .await
        .expect("Failed to submit");
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let session = wait_until_settled(&client, &base).await;
    let image = session.image().expect("Session should describe the image");
    assert_eq!(image.media_type(), "image/png");
    assert_eq!(image.size_bytes(), algebra_png().len());

    let response = client
        .get(format!("{base}/api/session/image"))
        .send()
        .await
        .expect("Failed to fetch image");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    let bytes = response.bytes().await.expect("Failed to read image");
    assert_eq!(bytes.as_ref(), algebra_png().as_slice());
}

/// Images above the configured limit end in the read-failure message
/// without reaching the analyzer.
#[tokio::test]
async fn test_oversized_image_reaches_read_error() {
    let analyzer = ScriptedAnalyzer::new(vec![Step::Succeed]);
    let config = Config {
        max_image_bytes: 16,
        ..Config::default()
    };
    let state = AppState::new(config, analyzer.clone());
    let (base, _handle) = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/session/submit"))
        .header("content-type", "image/png")
        .body(vec![7u8; 32])
        .send()
        .await
        .expect("Failed to submit");
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let session = wait_until_settled(&client, &base).await;
    assert_eq!(session.error_message(), Some(READ_FAILED_MESSAGE));
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = AppState::new(Config::default(), ScriptedAnalyzer::new(vec![Step::Succeed]));
    let (base, _handle) = spawn_test_server(state).await;

    let body: serde_json::Value = reqwest::get(format!("{base}/api/health"))
        .await
        .expect("Failed to call health")
        .json()
        .await
        .expect("Failed to parse health");
    assert_eq!(body, serde_json::json!({ "status": "ok" }));
}

// ============================================================================
// Fixture tests
// ============================================================================

/// Tests that the sample config loads and keeps defaults for omitted fields.
#[test]
fn test_sample_config_loads() {
    let config_path = fixture_path().join("snapsolve.json");
    let config = Config::load_from_file(&config_path).expect("Failed to load config");

    assert_eq!(config.model, "gemini-2.5-flash");
    assert_eq!(config.api_key_env, "SNAPSOLVE_API_KEY");
    assert_eq!(config.request_timeout, 30);
    assert_eq!(config.max_image_bytes, 5 * 1024 * 1024);
    assert_eq!(config.port, 8080);
    assert_eq!(config.host, "127.0.0.1");
}

/// Tests that the fixture image reads from disk with its format.
#[tokio::test]
async fn test_fixture_image_reads_from_file() {
    let image = read_image(
        ImageSource::File(fixture_path().join("algebra.png")),
        Config::default().max_image_bytes,
    )
    .await
    .expect("Failed to read fixture image");

    assert_eq!(image.media_type(), "image/png");
    assert_eq!(&image.bytes()[1..4], b"PNG");
}
