//! Session controller.
//!
//! The only component that mutates the [`Session`]. A submission moves the
//! session to `Analyzing` right away; reading the image and the analysis
//! call then run on a spawned task, which ends the submission in `Success`
//! or `Error` exactly once.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analysis::{AnalysisResult, Analyzer};
use crate::error::{AnalysisError, Result};
use crate::image::{read_image, ImageData, ImageSource};
use crate::session::{PhaseKind, Session};
use crate::websocket::{EventBroadcaster, SessionEvent};

/// Shown when the submitted image cannot be read or is not acceptable.
pub const READ_FAILED_MESSAGE: &str = "Failed to read the file.";

/// Shown when the analysis service fails or answers with something unusable.
pub const ANALYSIS_FAILED_MESSAGE: &str =
    "We couldn't analyze this image. It might be blurry or unsupported.";

/// Shown for anything else, such as a crash inside the pipeline.
pub const UNEXPECTED_MESSAGE: &str = "Something went wrong. Please try again.";

/// Why a submission ended in `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The image could not be read, decoded, or validated.
    Input,
    /// The analysis service call failed.
    Analysis,
    /// An internal failure.
    Unexpected,
}

impl FailureKind {
    /// The fixed, non-technical message for this failure.
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Input => READ_FAILED_MESSAGE,
            Self::Analysis => ANALYSIS_FAILED_MESSAGE,
            Self::Unexpected => UNEXPECTED_MESSAGE,
        }
    }
}

/// An accepted submission.
#[derive(Debug)]
pub struct Submission {
    /// Submission number within this process.
    pub number: u64,
    /// The session right after entering `Analyzing`.
    pub session: Session,
    /// Completes once the session has left `Analyzing`.
    pub handle: JoinHandle<()>,
}

/// Owns the session and drives all of its transitions.
#[derive(Clone)]
pub struct SessionController {
    session: Arc<Mutex<Session>>,
    analyzer: Arc<dyn Analyzer>,
    broadcaster: EventBroadcaster,
    max_image_bytes: u64,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("max_image_bytes", &self.max_image_bytes)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Creates a controller with a fresh session in `Home`.
    #[must_use]
    pub fn new(analyzer: Arc<dyn Analyzer>, max_image_bytes: u64) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            analyzer,
            broadcaster: EventBroadcaster::default(),
            max_image_bytes,
        }
    }

    /// Returns a copy of the current session.
    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Returns the image of the current submission, if it has been read.
    pub async fn image(&self) -> Option<ImageData> {
        self.session.lock().await.image_data().cloned()
    }

    /// Subscribes to phase change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcaster.subscribe()
    }

    /// Number of live event subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.receiver_count()
    }

    /// Accepts an image and starts analyzing it.
    ///
    /// The session is `Analyzing` when this returns; the rest of the work
    /// runs on the returned task.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` unless the session is in
    /// `Home`. The session is not changed in that case.
    pub async fn submit(&self, source: ImageSource) -> Result<Submission> {
        let (number, session) = {
            let mut session = self.session.lock().await;
            let number = session.begin_analysis()?;
            let snapshot = session.clone();
            self.broadcaster
                .send(SessionEvent::phase_changed(PhaseKind::Home, snapshot.clone()));
            (number, snapshot)
        };

        info!(
            submission = number,
            source = source.kind(),
            "Submission accepted"
        );

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            controller.run_submission(number, source).await;
        });

        Ok(Submission {
            number,
            session,
            handle,
        })
    }

    /// Returns to `Home`, clearing the image, result, and error message.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::InvalidStateTransition` while `Analyzing`.
    pub async fn reset(&self) -> Result<Session> {
        let mut session = self.session.lock().await;
        let from = session.kind();
        session.reset()?;

        let snapshot = session.clone();
        if from != PhaseKind::Home {
            self.broadcaster
                .send(SessionEvent::phase_changed(from, snapshot.clone()));
            info!(from = %from, "Session reset");
        }
        Ok(snapshot)
    }

    async fn run_submission(&self, number: u64, source: ImageSource) {
        // A panic anywhere in the pipeline surfaces as a JoinError here
        let pipeline = self.clone();
        let outcome = match tokio::spawn(async move { pipeline.process(number, source).await }).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(submission = number, error = %e, "Submission pipeline aborted");
                Err(FailureKind::Unexpected)
            }
        };

        self.finish(number, outcome).await;
    }

    async fn process(
        &self,
        number: u64,
        source: ImageSource,
    ) -> std::result::Result<AnalysisResult, FailureKind> {
        let image = read_image(source, self.max_image_bytes)
            .await
            .map_err(|e| {
                warn!(submission = number, error = %e, "Failed to read submitted image");
                FailureKind::Input
            })?;

        debug!(
            submission = number,
            media_type = image.media_type(),
            size_bytes = image.size_bytes(),
            "Image read"
        );

        self.session
            .lock()
            .await
            .attach_image(image.clone())
            .map_err(|e| {
                error!(submission = number, error = %e, "Session left analyzing before image was attached");
                FailureKind::Unexpected
            })?;

        self.analyzer.analyze(&image).await.map_err(|e| {
            log_analysis_error(number, &e);
            FailureKind::Analysis
        })
    }

    async fn finish(&self, number: u64, outcome: std::result::Result<AnalysisResult, FailureKind>) {
        let mut session = self.session.lock().await;

        let transition = match outcome {
            Ok(result) => session.succeed(result),
            Err(kind) => session.fail(kind.user_message()),
        };

        match transition {
            Ok(()) => {
                info!(submission = number, phase = %session.kind(), "Submission finished");
                self.broadcaster.send(SessionEvent::phase_changed(
                    PhaseKind::Analyzing,
                    session.clone(),
                ));
            }
            Err(e) => {
                error!(submission = number, error = %e, "Could not record submission outcome");
            }
        }
    }
}

fn log_analysis_error(number: u64, err: &AnalysisError) {
    match err {
        AnalysisError::Service { kind, .. } => {
            warn!(
                submission = number,
                kind = %kind,
                error = %err,
                suggestion = kind.suggestion(),
                "Analysis service call failed"
            );
        }
        AnalysisError::EmptyResponse | AnalysisError::MalformedResponse(_) => {
            warn!(submission = number, error = %err, "Unusable analysis response");
        }
    }
}
