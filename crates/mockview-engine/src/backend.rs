//! Interfaces to the external services the engine depends on.
//!
//! Every backend is an object-safe async trait so sessions can run against
//! [`crate::http::HttpBackends`] in production and scripted doubles in tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Request/Response Types
// ============================================================================

/// One chat message sent to the text generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `assistant` or `user`.
    pub role: String,
    /// Message content.
    pub content: String,
}

/// A text generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System instruction.
    pub system: String,
    /// Conversation so far; empty for single-shot prompts.
    pub messages: Vec<ChatMessage>,
}

/// A coding problem generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRequest {
    /// Role the candidate is interviewing for.
    pub role: String,
    /// Company type being simulated.
    pub company_type: String,
    /// Titles of problems already shown this session.
    pub exclude: Vec<String>,
}

/// A code execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language identifier understood by the execution backend.
    pub language: String,
    /// Complete program source.
    pub code: String,
}

/// Output of one remote execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Captured standard output.
    #[serde(default)]
    pub stdout: Option<String>,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: Option<String>,
}

/// A frame submitted for affect detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectRequest {
    /// Session the frame belongs to.
    pub session_id: String,
    /// Encoded still frame (data URL or base64).
    pub frame: String,
}

/// The detection backend's verdict on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectVerdict {
    /// Whether the candidate looks nervous.
    pub nervous: bool,
    /// Detector confidence.
    #[serde(default)]
    pub score: f64,
    /// Frame echoed back by the detector, if any.
    #[serde(default)]
    pub frame: Option<String>,
}

/// A flagged sample to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectSampleRecord {
    /// Session the sample belongs to.
    pub session_id: String,
    /// The flagged frame.
    pub frame: String,
    /// Detector confidence.
    pub score: f64,
}

/// Update applied to the externally owned session record at explicit end.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecordPatch {
    /// Where the uploaded report lives.
    pub report_url: String,
    /// Full transcript.
    pub messages: Vec<crate::transcript::Message>,
    /// Coding round records.
    pub solved_problems: Vec<crate::coding::SolvedProblemRecord>,
}

// ============================================================================
// Traits
// ============================================================================

/// AI text generation, used for interviewer turns, the greeting and feedback.
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// Generates a completion.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Coding problem generation.
#[async_trait]
pub trait ProblemBackend: Send + Sync {
    /// Generates a problem payload, either structured or generative text.
    async fn generate(&self, request: ProblemRequest) -> Result<serde_json::Value>;
}

/// Remote code execution.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Runs a program and returns its captured output.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput>;
}

/// Nervousness detection and storage.
#[async_trait]
pub trait AffectBackend: Send + Sync {
    /// Classifies one frame.
    async fn analyze(&self, request: AffectRequest) -> Result<AffectVerdict>;

    /// Persists a flagged sample.
    async fn store(&self, record: AffectSampleRecord) -> Result<()>;
}

/// Report storage and session record updates.
#[async_trait]
pub trait ReportBackend: Send + Sync {
    /// Uploads the report text and returns its URL.
    async fn upload_report(&self, session_id: &str, text: &str) -> Result<String>;

    /// Patches the session record.
    async fn patch_session(&self, session_id: &str, patch: SessionRecordPatch) -> Result<()>;
}

/// The full set of backends a session talks to.
#[derive(Clone)]
pub struct Backends {
    /// Text generation (turns, greeting, feedback).
    pub text: Arc<dyn TextBackend>,
    /// Problem generation.
    pub problems: Arc<dyn ProblemBackend>,
    /// Code execution.
    pub execution: Arc<dyn ExecutionBackend>,
    /// Affect detection and storage.
    pub affect: Arc<dyn AffectBackend>,
    /// Report upload and session record.
    pub report: Arc<dyn ReportBackend>,
}

impl Backends {
    /// Uses one value for every backend.
    #[must_use]
    pub fn uniform<B>(backend: Arc<B>) -> Self
    where
        B: TextBackend + ProblemBackend + ExecutionBackend + AffectBackend + ReportBackend + 'static,
    {
        Self {
            text: backend.clone(),
            problems: backend.clone(),
            execution: backend.clone(),
            affect: backend.clone(),
            report: backend,
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
