//! HTTP API for driving a running interview session.
//!
//! A presentation layer (browser page, terminal client, test harness) uses
//! these endpoints to submit answers and code, and subscribes to `/ws` for
//! session events.
//!
//! # Endpoints
//!
//! - `GET /api/session` - Session snapshot
//! - `POST /api/session/answer` - Submit a typed answer
//! - `POST /api/session/capture` - Start listening for a spoken answer
//! - `POST /api/session/end` - End the session
//! - `POST /api/coding/editor/open` - Open the code editor
//! - `POST /api/coding/editor/close` - Close the code editor
//! - `POST /api/coding/submit` - Run code against the current problem
//! - `POST /api/coding/skip` - Skip the current problem
//! - `POST /api/coding/next` - Fetch a new problem
//! - `GET /ws` - Event stream

use axum::{
    extract::State,
    http::StatusCode,
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

use crate::coding::{AttemptProgress, CodingProblem, Language};
use crate::error::InterviewError;
use crate::session::{
    EndReason, EndSummary, InterviewSession, SessionSnapshot, SubmissionOutcome, TurnOutcome,
};
use crate::websocket::ws_handler;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/session/answer`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    /// The candidate's answer.
    pub text: String,
}

/// Request body for `POST /api/session/end`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndRequest {
    /// Why the session ends. Defaults to an explicit end.
    #[serde(default)]
    pub reason: Option<EndReason>,
}

/// Response body for `POST /api/session/end`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndResponse {
    /// Whether this request ended the session.
    pub ended: bool,
    /// Summary, when this request ended the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<EndSummary>,
}

/// Request body for `POST /api/coding/submit`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitCodeRequest {
    /// Candidate code.
    pub code: String,
    /// Language; defaults to the configured language.
    #[serde(default)]
    pub language: Option<Language>,
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
    /// The session being driven.
    pub session: InterviewSession,
}

impl AppState {
    /// Wraps a running session.
    #[must_use]
    pub const fn new(session: InterviewSession) -> Self {
        Self { session }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Maps engine errors onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(InterviewError);

impl From<InterviewError> for ApiError {
    fn from(error: InterviewError) -> Self {
        Self(error)
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match &self.0 {
            InterviewError::NoOpenProblem { .. }
            | InterviewError::AttemptInFlight
            | InterviewError::CaptureRejected { .. }
            | InterviewError::InvalidStageTransition { .. } => StatusCode::CONFLICT,
            InterviewError::SessionEnded => StatusCode::GONE,
            InterviewError::NetworkFailure { .. } | InterviewError::ReportUpload { .. } => {
                StatusCode::BAD_GATEWAY
            }
            InterviewError::Recognition(_) | InterviewError::PermissionDenied { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints, `/ws`, CORS and request
/// tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/session", get(handle_snapshot))
        .route("/session/answer", post(handle_answer))
        .route("/session/capture", post(handle_capture))
        .route("/session/end", post(handle_end))
        .route("/coding/editor/open", post(handle_open_editor))
        .route("/coding/editor/close", post(handle_close_editor))
        .route("/coding/submit", post(handle_submit_code))
        .route("/coding/skip", post(handle_skip))
        .route("/coding/next", post(handle_next_problem));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_snapshot(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot().await)
}

async fn handle_answer(
    State(state): State<AppState>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<TurnOutcome> {
    info!(chars = request.text.len(), "Received answer");
    Ok(Json(state.session.submit_answer(&request.text).await?))
}

async fn handle_capture(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.session.start_capture()?;
    Ok(StatusCode::ACCEPTED)
}

async fn handle_end(
    State(state): State<AppState>,
    request: Option<Json<EndRequest>>,
) -> ApiResult<EndResponse> {
    let reason = request
        .and_then(|Json(r)| r.reason)
        .unwrap_or(EndReason::Explicit);
    info!(?reason, "End request received");

    let summary = state.session.end_session(reason).await?;
    Ok(Json(EndResponse {
        ended: summary.is_some(),
        summary,
    }))
}

async fn handle_open_editor(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.session.open_code_editor().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_close_editor(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.session.close_code_editor().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_submit_code(
    State(state): State<AppState>,
    Json(request): Json<SubmitCodeRequest>,
) -> ApiResult<SubmissionOutcome> {
    let language = match request.language {
        Some(language) => language,
        None => {
            let name = &state.session.config().coding.default_language;
            Language::from_name(name).unwrap_or(Language::JavaScript)
        }
    };
    Ok(Json(state.session.submit_code(&request.code, language).await?))
}

async fn handle_skip(State(state): State<AppState>) -> ApiResult<AttemptProgress> {
    Ok(Json(state.session.skip_current_problem().await?))
}

async fn handle_next_problem(State(state): State<AppState>) -> ApiResult<CodingProblem> {
    Ok(Json(state.session.fetch_next_problem().await?))
}

// ============================================================================
// Tests
// ============================================================================
