//! Session state for the SnapSolve tutor.
//!
//! This module defines the state machine that sequences a homework
//! submission from upload through analysis to a result or error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::error::{Result, TutorError};
use crate::image::{ImageData, ImageInfo};

// ============================================================================
// Phase
// ============================================================================

/// Current phase of the tutoring session.
///
/// The phase transitions through these states:
/// - `Home` -> `Analyzing` (submit)
/// - `Analyzing` -> `Success` or `Error` (analysis finished)
/// - `Success` / `Error` -> `Home` (reset)
///
/// The analysis result and the error message live inside their phases, so a
/// session can never show a stale result next to a new error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "data", rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for an image.
    #[default]
    Home,
    /// An image was submitted and is being read and analyzed.
    Analyzing,
    /// Analysis finished with a tutoring result.
    Success(AnalysisResult),
    /// The submission failed.
    Error {
        /// Non-technical message for the user.
        message: String,
    },
}

impl Phase {
    /// Returns the data-free kind of this phase.
    #[must_use]
    pub const fn kind(&self) -> PhaseKind {
        match self {
            Self::Home => PhaseKind::Home,
            Self::Analyzing => PhaseKind::Analyzing,
            Self::Success(_) => PhaseKind::Success,
            Self::Error { .. } => PhaseKind::Error,
        }
    }

}

/// Phase discriminant without payload, used in events and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    /// See [`Phase::Home`].
    Home,
    /// See [`Phase::Analyzing`].
    Analyzing,
    /// See [`Phase::Success`].
    Success,
    /// See [`Phase::Error`].
    Error,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Home => write!(f, "home"),
            Self::Analyzing => write!(f, "analyzing"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// The single tutoring session of the process.
///
/// Fields are only changed through the transition methods below, each of
/// which validates the current phase first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    phase: Phase,
    image: Option<ImageInfo>,
    #[serde(skip)]
    image_data: Option<ImageData>,
    submissions: u64,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Creates a new session in the `Home` phase with no image.
    ///
    /// # Examples
    ///
    /// ```
    /// use snapsolve_tutor::{PhaseKind, Session};
    ///
    /// let session = Session::new();
    /// assert_eq!(session.kind(), PhaseKind::Home);
    /// assert!(session.image().is_none());
    /// assert_eq!(session.submissions(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            phase: Phase::Home,
            image: None,
            image_data: None,
            submissions: 0,
            started_at: now,
            updated_at: now,
        }
    }

    /// The current phase.
    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    /// The current phase kind.
    #[must_use]
    pub const fn kind(&self) -> PhaseKind {
        self.phase.kind()
    }

    /// Media type and size of the current image, once it has been read.
    #[must_use]
    pub const fn image(&self) -> Option<&ImageInfo> {
        self.image.as_ref()
    }

    /// The current image with its bytes.
    ///
    /// Only the process that read the image has the bytes; a session
    /// deserialized from JSON carries just the [`ImageInfo`].
    #[must_use]
    pub const fn image_data(&self) -> Option<&ImageData> {
        self.image_data.as_ref()
    }

    /// Number of submissions accepted since the process started.
    #[must_use]
    pub const fn submissions(&self) -> u64 {
        self.submissions
    }

    /// When the session was created.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the session last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The tutoring result, present only in the `Success` phase.
    #[must_use]
    pub const fn result(&self) -> Option<&AnalysisResult> {
        match &self.phase {
            Phase::Success(result) => Some(result),
            _ => None,
        }
    }

    /// The user-facing error message, present only in the `Error` phase.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.phase {
            Phase::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Returns `true` while a submission is being processed.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Analyzing)
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Starts a new submission: `Home` -> `Analyzing`.
    ///
    /// Returns the submission number.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the session is in
    /// `Home`; the session is left untouched.
    pub fn begin_analysis(&mut self) -> Result<u64> {
        self.expect_phase(PhaseKind::Home, PhaseKind::Analyzing)?;

        self.phase = Phase::Analyzing;
        self.clear_image();
        self.submissions += 1;
        self.touch();
        Ok(self.submissions)
    }

    /// Stores the decoded image of the running submission.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the session is
    /// `Analyzing`.
    pub fn attach_image(&mut self, image: ImageData) -> Result<()> {
        self.expect_phase(PhaseKind::Analyzing, PhaseKind::Analyzing)?;

        self.image = Some(image.info());
        self.image_data = Some(image);
        self.touch();
        Ok(())
    }

    /// Finishes the running submission with a result: `Analyzing` -> `Success`.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the session is
    /// `Analyzing`.
    pub fn succeed(&mut self, result: AnalysisResult) -> Result<()> {
        self.expect_phase(PhaseKind::Analyzing, PhaseKind::Success)?;

        self.phase = Phase::Success(result);
        self.touch();
        Ok(())
    }

    /// Finishes the running submission with an error: `Analyzing` -> `Error`.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the session is
    /// `Analyzing`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.expect_phase(PhaseKind::Analyzing, PhaseKind::Error)?;

        self.phase = Phase::Error {
            message: message.into(),
        };
        self.touch();
        Ok(())
    }

    /// Returns to `Home`, clearing the image, result, and error.
    ///
    /// Resetting from `Home` is a no-op apart from the timestamp.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` while `Analyzing`.
    pub fn reset(&mut self) -> Result<()> {
        if self.is_busy() {
            return Err(TutorError::invalid_transition(
                self.kind(),
                PhaseKind::Home,
            ));
        }

        self.phase = Phase::Home;
        self.clear_image();
        self.touch();
        Ok(())
    }

    fn clear_image(&mut self) {
        self.image = None;
        self.image_data = None;
    }

    fn expect_phase(&self, required: PhaseKind, target: PhaseKind) -> Result<()> {
        if self.kind() == required {
            Ok(())
        } else {
            Err(TutorError::invalid_transition(self.kind(), target))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
