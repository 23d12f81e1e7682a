//! HTTP API endpoints for the SnapSolve tutor.
//!
//! Front ends drive the session through these endpoints and follow its
//! progress over the `/ws` event stream.
//!
//! # Endpoints
//!
//! - `GET /api/session` - Current session
//! - `POST /api/session/submit` - Submit a homework image
//! - `POST /api/session/reset` - Return to the home phase
//! - `GET /api/session/image` - Bytes of the submitted image
//! - `GET /api/health` - Liveness check
//! - `GET /ws` - WebSocket event stream
//!
//! # Example
//!
//! ```no_run
//! use snapsolve_tutor::{create_router, AppState, Config, GeminiClient};
//! use std::sync::Arc;
//!
//! # async fn example() -> snapsolve_tutor::Result<()> {
//! let config = Config::load()?;
//! let analyzer = Arc::new(GeminiClient::from_config(&config)?);
//! let router = create_router(AppState::new(config, analyzer));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::analysis::Analyzer;
use crate::controller::SessionController;
use crate::error::TutorError;
use crate::image::ImageSource;
use crate::session::Session;
use crate::websocket::ws_handler;
use crate::Config;

/// Extra room for request bodies beyond the image limit, covering base64
/// expansion of data URLs and the JSON envelope.
const BODY_LIMIT_SLACK: usize = 64 * 1024;

// ============================================================================
// Request/Response Types
// ============================================================================

/// JSON body for `POST /api/session/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// The image as a base64 `data:` URL.
    pub image_data: String,
}

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Tutor configuration.
    pub config: Config,
    /// Controller owning the session.
    pub controller: SessionController,
}

impl AppState {
    /// Creates a new `AppState` with a fresh session analyzed by `analyzer`.
    #[must_use]
    pub fn new(config: Config, analyzer: Arc<dyn Analyzer>) -> Self {
        let controller = SessionController::new(analyzer, config.max_image_bytes);
        Self { config, controller }
    }

    fn body_limit(&self) -> usize {
        let image_limit = usize::try_from(self.config.max_image_bytes).unwrap_or(usize::MAX);
        // base64 grows the payload by a third
        image_limit
            .saturating_add(image_limit / 3)
            .saturating_add(BODY_LIMIT_SLACK)
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The session is not in a phase that allows the request.
    Conflict(String),
    /// The request body could not be understood.
    BadRequest(String),
    /// The requested resource does not exist.
    NotFound(String),
    /// Anything else.
    Internal(String),
}

impl From<TutorError> for ApiError {
    fn from(err: TutorError) -> Self {
        match err {
            TutorError::InvalidStateTransition { .. } => Self::Conflict(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router has:
/// - All API routes under `/api`
/// - The WebSocket endpoint at `/ws`
/// - CORS middleware allowing any origin
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.body_limit();

    let api_routes = Router::new()
        .route("/session", get(handle_session))
        .route("/session/submit", post(handle_submit))
        .route("/session/reset", post(handle_reset))
        .route("/session/image", get(handle_image))
        .route("/health", get(handle_health));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/session`.
async fn handle_session(State(state): State<Arc<AppState>>) -> Json<Session> {
    Json(state.controller.snapshot().await)
}

/// Handler for `POST /api/session/submit`.
///
/// Accepts either a JSON [`SubmitRequest`] or the raw image bytes with the
/// image's media type as `Content-Type`. Answers `202 Accepted` with the
/// session in `analyzing`; the outcome arrives later.
async fn handle_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let source = if is_json(&content_type) {
        let request: SubmitRequest = serde_json::from_slice(&body).map_err(|e| {
            warn!(error = %e, "Rejected submit request with invalid JSON body");
            ApiError::BadRequest(format!("Invalid submit request: {e}"))
        })?;
        ImageSource::DataUrl(request.image_data)
    } else {
        ImageSource::bytes(body.to_vec(), content_type)
    };

    let submission = state.controller.submit(source).await.map_err(|e| {
        warn!(error = %e, "Submit rejected");
        ApiError::from(e)
    })?;

    info!(submission = submission.number, "Submission started");
    Ok((StatusCode::ACCEPTED, Json(submission.session)))
}

/// Handler for `POST /api/session/reset`.
async fn handle_reset(State(state): State<Arc<AppState>>) -> Result<Json<Session>, ApiError> {
    let session = state.controller.reset().await.map_err(|e| {
        warn!(error = %e, "Reset rejected");
        ApiError::from(e)
    })?;
    Ok(Json(session))
}

/// Handler for `GET /api/session/image`.
async fn handle_image(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let image = state
        .controller
        .image()
        .await
        .ok_or_else(|| ApiError::NotFound("No image has been submitted".to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, image.media_type().to_string())],
        image.bytes().to_vec(),
    )
        .into_response())
}

/// Handler for `GET /api/health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

// ============================================================================
// Tests
// ============================================================================
