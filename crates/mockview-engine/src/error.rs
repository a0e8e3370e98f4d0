//! Error types for the MockView interview engine.
//!
//! This module defines the error hierarchy for every engine operation:
//! configuration loading, media acquisition, backend calls, speech capture,
//! the coding round, and report submission.

use std::path::PathBuf;

/// A specialized `Result` type for interview engine operations.
pub type Result<T> = std::result::Result<T, InterviewError>;

/// Errors that can occur while running a mock interview.
///
/// Variants carry actionable suggestions where the candidate or operator can
/// do something about them.
#[derive(Debug, thiserror::Error)]
pub enum InterviewError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your mockview.json with a JSON linter")]
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

    // ========================================================================
    // Media Errors
    // ========================================================================
    /// Camera or microphone access was refused.
    ///
    /// Fatal to session start; there is nothing to release.
    #[error("Camera and microphone access denied: {message}\n\nSuggestion: Allow camera and microphone access in your browser or OS settings, then start the interview again")]
    PermissionDenied {
        /// Platform-provided reason.
        message: String,
    },

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// A backend call failed (transport error or non-success status).
    #[error("{backend} backend request failed: {message}\n\nSuggestion: Check your network connection and try again")]
    NetworkFailure {
        /// Which backend failed.
        backend: BackendKind,
        /// Description of the failure.
        message: String,
    },

    /// Uploading the report or patching the session record failed.
    #[error("Failed to submit interview report: {message}\n\nSuggestion: Check your network connection; the transcript is still available in the session snapshot")]
    ReportUpload {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Speech Errors
    // ========================================================================
    /// The recognizer reported an error other than "no speech".
    #[error("Speech recognition failed: {0}\n\nSuggestion: Check your microphone and start capture again")]
    Recognition(RecognitionError),

    /// Capture was requested while a turn was in flight or speech was playing.
    #[error("Cannot start speech capture: {reason}")]
    CaptureRejected {
        /// Why capture was refused.
        reason: String,
    },

    // ========================================================================
    // Coding Round Errors
    // ========================================================================
    /// No coding problem is currently open.
    #[error("No coding problem is open (current stage: {stage})")]
    NoOpenProblem {
        /// The stage the session was in.
        stage: String,
    },

    /// A code submission is already being executed.
    #[error("A code submission is already running; wait for its results")]
    AttemptInFlight,

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid stage transition attempted.
    #[error("Invalid stage transition: cannot go from {from} to {to}")]
    InvalidStageTransition {
        /// The current stage.
        from: String,
        /// The attempted target stage.
        to: String,
    },

    /// The session has already ended.
    #[error("The interview session has ended")]
    SessionEnded,

    // ========================================================================
    // General Errors
    // ========================================================================
    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The external services the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// AI text generation (interviewer replies and greeting).
    TextGeneration,
    /// Answer feedback generation.
    Feedback,
    /// Coding problem generation.
    ProblemGeneration,
    /// Remote code execution.
    CodeExecution,
    /// Nervousness detection.
    AffectDetection,
    /// Storage of flagged affect samples.
    AffectStorage,
    /// Report storage and session record patching.
    Report,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextGeneration => write!(f, "text_generation"),
            Self::Feedback => write!(f, "feedback"),
            Self::ProblemGeneration => write!(f, "problem_generation"),
            Self::CodeExecution => write!(f, "code_execution"),
            Self::AffectDetection => write!(f, "affect_detection"),
            Self::AffectStorage => write!(f, "affect_storage"),
            Self::Report => write!(f, "report"),
        }
    }
}

/// Errors reported by a speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// The session ended without hearing speech. Ignored.
    NoSpeech,
    /// Microphone capture failed.
    AudioCapture,
    /// Recognition permission was refused.
    NotAllowed,
    /// The recognition service was unreachable.
    Network,
    /// Any other platform error.
    Other(String),
}

impl RecognitionError {
    /// Returns `true` if the error should be silently ignored.
    #[must_use]
    pub const fn is_ignorable(&self) -> bool {
        matches!(self, Self::NoSpeech)
    }
}

impl std::fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::Network => write!(f, "network"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl InterviewError {
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

    /// Creates a new `PermissionDenied` error.
    #[must_use]
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Creates a new `NetworkFailure` for the given backend.
    #[must_use]
    pub fn network(backend: BackendKind, message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            backend,
            message: message.into(),
        }
    }

    /// Creates a new `ReportUpload` error.
    #[must_use]
    pub fn report_upload(message: impl Into<String>) -> Self {
        Self::ReportUpload {
            message: message.into(),
        }
    }

    /// Creates a new `CaptureRejected` error.
    #[must_use]
    pub fn capture_rejected(reason: impl Into<String>) -> Self {
        Self::CaptureRejected {
            reason: reason.into(),
        }
    }

    /// Creates a new `NoOpenProblem` error.
    #[must_use]
    pub fn no_open_problem(stage: impl std::fmt::Display) -> Self {
        Self::NoOpenProblem {
            stage: stage.to_string(),
        }
    }

    /// Creates a new `InvalidStageTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStageTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if the candidate should be shown this error.
    ///
    /// Only permission errors, network failures on a turn or report submission,
    /// and hard recognition errors are surfaced; everything else degrades
    /// quietly.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. }
                | Self::NetworkFailure {
                    backend: BackendKind::TextGeneration | BackendKind::Report,
                    ..
                }
                | Self::ReportUpload { .. }
                | Self::Recognition(_)
        )
    }

    /// Returns `true` if this error prevents the session from continuing.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::PermissionDenied { .. }
                | Self::SessionEnded
        )
    }
}
