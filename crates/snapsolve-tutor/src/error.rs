//! Error types for the SnapSolve tutor.
//!
//! This module defines the error hierarchy for configuration loading,
//! image intake, the external analysis service, and session transitions.

use std::path::PathBuf;

/// A specialized `Result` type for SnapSolve tutor operations.
pub type Result<T> = std::result::Result<T, TutorError>;

/// Errors that can occur while running the tutor.
///
/// Variants carry actionable suggestions where a user can fix the cause.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your snapsolve.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The environment variable holding the API key is unset or empty.
    #[error("API key not found in environment variable '{var}'\n\nSuggestion: Export {var}=<your Gemini API key> or change 'apiKeyEnv' in snapsolve.json")]
    MissingApiKey {
        /// Name of the environment variable that was read.
        var: String,
    },

    /// The HTTP client for the analysis service could not be built.
    #[error("Failed to initialize HTTP client: {0}")]
    HttpClient(String),

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current phase.
        from: String,
        /// The attempted target phase.
        to: String,
    },
}

impl TutorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `MissingApiKey` error.
    #[must_use]
    pub fn missing_api_key(var: impl Into<String>) -> Self {
        Self::MissingApiKey { var: var.into() }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

// ============================================================================
// Image Errors
// ============================================================================

/// Errors raised while reading or decoding a submitted image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The image contained no bytes.
    #[error("image is empty")]
    Empty,

    /// The declared media type is not an image type.
    #[error("unsupported media type '{media_type}': expected an image/* type")]
    UnsupportedMediaType {
        /// The declared media type.
        media_type: String,
    },

    /// The image exceeds the configured size limit.
    #[error("image is {size_bytes} bytes, larger than the {limit_bytes} byte limit")]
    TooLarge {
        /// Actual size in bytes.
        size_bytes: u64,
        /// Configured limit in bytes.
        limit_bytes: u64,
    },

    /// The data URL could not be parsed.
    #[error("malformed data URL: {0}")]
    MalformedDataUrl(String),

    /// The base64 payload could not be decoded.
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The image file does not exist.
    #[error("image file not found: '{path}'")]
    NotFound {
        /// Path that was read.
        path: PathBuf,
    },

    /// The file extension does not map to a known image format.
    #[error("cannot determine image format of '{path}'")]
    UnknownFormat {
        /// Path that was read.
        path: PathBuf,
    },

    /// Reading the image failed.
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Analysis Errors
// ============================================================================

/// Errors raised by the external analysis service.
///
/// None of these messages is shown to end users; they are logged and the
/// session reports a fixed, non-technical message instead.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The request failed at the transport level or the service returned an
    /// error status.
    #[error("Analysis service error ({kind}): {message}")]
    Service {
        /// Category of the failure.
        kind: ServiceErrorKind,
        /// Detail from the transport or the service.
        message: String,
    },

    /// The service answered without any response text.
    #[error("No response from AI")]
    EmptyResponse,

    /// The response text did not decode into the expected structure.
    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    /// Creates a new `Service` error.
    #[must_use]
    pub fn service(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self::Service {
            kind,
            message: message.into(),
        }
    }

    /// Creates a new `MalformedResponse` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }
}

/// Categories of analysis service failures for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ServiceErrorKind {
    /// Classifies an HTTP status code returned by the service.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Returns a suggestion message for operators reading the logs.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key or credentials",
            Self::RateLimit => "Wait before submitting again, or reduce request frequency",
            Self::Server => "Try again later; the analysis service may be experiencing issues",
            Self::Network => "Check your network connection",
            Self::Timeout => "Increase 'requestTimeout' in snapsolve.json or try a smaller image",
            Self::Other => "Check the analysis service's status page",
        }
    }
}
