//! MockView Report Generation
//!
//! This crate renders the end-of-session interview report as plain text and
//! parses the transcript section back. The text form is what gets uploaded to
//! the report store when a candidate explicitly ends an interview.
//!
//! # Types
//!
//! - [`ReportInput`] - Everything the report is built from
//! - [`TranscriptEntry`] - One transcript message, optionally with feedback
//! - [`ProblemOutcome`] - One solved or skipped coding problem
//!
//! # Generators
//!
//! - [`TextReportGenerator`] - Renders the report text
//! - [`parse_transcript`] - Recovers transcript entries from report text
//!
//! # Example
//!
//! ```rust
//! use mockview_report::{ReportInput, Speaker, TextReportGenerator, TranscriptEntry};
//!
//! let input = ReportInput {
//!     session_id: "abc".to_string(),
//!     role: "Backend Engineer".to_string(),
//!     company_type: "Startup".to_string(),
//!     generated_at: chrono::Utc::now(),
//!     transcript: vec![TranscriptEntry::new("intro", Speaker::Ai, "Tell me about yourself.")],
//!     problems: vec![],
//! };
//!
//! let text = TextReportGenerator::new(&input).generate();
//! assert!(text.contains("[intro] AI: Tell me about yourself."));
//! ```

mod text;

pub use text::{parse_transcript, TextReportGenerator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while building or parsing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A report line could not be parsed.
    #[error("malformed report line {line}: {message}")]
    Parse {
        /// 1-indexed line number within the report text.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

impl ReportError {
    /// Creates a new `Parse` error.
    #[must_use]
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Transcript entries (local copy to avoid a dependency on the engine)
// ============================================================================

/// Who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The AI interviewer.
    Ai,
    /// The candidate.
    User,
}

impl Speaker {
    /// Label used in the report text.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::User => "User",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "AI" => Some(Self::Ai),
            "User" => Some(Self::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Coaching feedback attached to a candidate answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackNote {
    /// What the candidate could improve.
    pub suggestion: String,
    /// An example of a stronger answer.
    pub example: String,
}

/// A single transcript message as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Interview stage the message was tagged with (e.g. `intro`).
    pub stage: String,
    /// Who said it.
    pub speaker: Speaker,
    /// The message text.
    pub text: String,
    /// Feedback, for candidate answers that received some.
    pub feedback: Option<FeedbackNote>,
}

impl TranscriptEntry {
    /// Creates an entry without feedback.
    #[must_use]
    pub fn new(stage: impl Into<String>, speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            speaker,
            text: text.into(),
            feedback: None,
        }
    }

    /// Attaches feedback to the entry.
    #[must_use]
    pub fn with_feedback(mut self, suggestion: impl Into<String>, example: impl Into<String>) -> Self {
        self.feedback = Some(FeedbackNote {
            suggestion: suggestion.into(),
            example: example.into(),
        });
        self
    }
}

/// Outcome of one coding problem in the round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemOutcome {
    /// Problem title.
    pub title: String,
    /// Whether the candidate skipped it.
    pub skipped: bool,
    /// Number of passing test cases (0 when skipped).
    pub passed_tests: usize,
    /// Number of test cases that were run (0 when skipped).
    pub total_tests: usize,
    /// Submitted code, absent when skipped.
    pub code: Option<String>,
    /// When the problem was solved or skipped.
    pub solved_at: DateTime<Utc>,
}

/// All data the report is rendered from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInput {
    /// Externally owned session id.
    pub session_id: String,
    /// Role the candidate interviewed for.
    pub role: String,
    /// Company type the interview simulated.
    pub company_type: String,
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
    /// Full transcript in chronological order.
    pub transcript: Vec<TranscriptEntry>,
    /// Coding round outcomes in the order they were recorded.
    pub problems: Vec<ProblemOutcome>,
}

impl ReportInput {
    /// Number of transcript entries that carry feedback.
    #[must_use]
    pub fn feedback_count(&self) -> usize {
        self.transcript
            .iter()
            .filter(|entry| entry.feedback.is_some())
            .count()
    }

    /// Number of problems solved (not skipped).
    #[must_use]
    pub fn solved_count(&self) -> usize {
        self.problems.iter().filter(|p| !p.skipped).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_labels() {
        assert_eq!(Speaker::Ai.to_string(), "AI");
        assert_eq!(Speaker::User.to_string(), "User");
        assert_eq!(Speaker::from_label("AI"), Some(Speaker::Ai));
        assert_eq!(Speaker::from_label("ai"), None);
    }

    #[test]
    fn test_feedback_and_solved_counts() {
        let now = Utc::now();
        let input = ReportInput {
            session_id: "s".to_string(),
            role: "r".to_string(),
            company_type: "c".to_string(),
            generated_at: now,
            transcript: vec![
                TranscriptEntry::new("intro", Speaker::Ai, "Hi"),
                TranscriptEntry::new("intro", Speaker::User, "Hello").with_feedback("a", "b"),
            ],
            problems: vec![
                ProblemOutcome {
                    title: "A".to_string(),
                    skipped: true,
                    passed_tests: 0,
                    total_tests: 0,
                    code: None,
                    solved_at: now,
                },
                ProblemOutcome {
                    title: "B".to_string(),
                    skipped: false,
                    passed_tests: 2,
                    total_tests: 2,
                    code: Some("x".to_string()),
                    solved_at: now,
                },
            ],
        };

        assert_eq!(input.feedback_count(), 1);
        assert_eq!(input.solved_count(), 1);
    }

    #[test]
    fn test_parse_error_display() {
        let err = ReportError::parse(7, "unknown speaker 'Bot'");
        assert_eq!(
            err.to_string(),
            "malformed report line 7: unknown speaker 'Bot'"
        );
    }
}
