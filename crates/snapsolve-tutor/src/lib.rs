//! SnapSolve homework tutor
//!
//! Session state machine, image intake, Gemini analysis client, HTTP API,
//! and WebSocket events.

pub mod analysis;
pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod gemini;
pub mod image;
pub mod session;
pub mod websocket;

pub use analysis::{
    parse_analysis, response_schema, AnalysisResult, Analyzer, PracticeQuestion,
    ANALYSIS_INSTRUCTION, EXPECTED_PRACTICE_QUESTIONS, TUTOR_PERSONA,
};
pub use api::{create_router, AppState, ErrorResponse, HealthResponse, SubmitRequest};
pub use config::Config;
pub use controller::{
    FailureKind, SessionController, Submission, ANALYSIS_FAILED_MESSAGE, READ_FAILED_MESSAGE,
    UNEXPECTED_MESSAGE,
};
pub use error::{AnalysisError, ImageError, Result, ServiceErrorKind, TutorError};
pub use gemini::GeminiClient;
pub use image::{read_image, ImageData, ImageFormat, ImageInfo, ImageSource, DEFAULT_MAX_IMAGE_BYTES};
pub use session::{Phase, PhaseKind, Session};
pub use websocket::{EventBroadcaster, SessionEvent};
