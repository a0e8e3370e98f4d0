//! Session events and their WebSocket stream.
//!
//! Everything observable about a running interview is broadcast as a
//! [`SessionEvent`]: transcript growth, stage changes, speech playback, live
//! capture drafts, the coding round and errors. Presentation layers subscribe
//! either in-process via [`EventBroadcaster::subscribe`] or over `GET /ws`.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes a session snapshot
//! - `stage_changed` - The interview moved to a new stage
//! - `message_appended` - A message was added to the transcript
//! - `feedback_attached` - Feedback arrived for a candidate answer
//! - `speech_started` / `speech_finished` - Interviewer playback
//! - `transcript_draft` - Live speech capture text
//! - `problem_opened` / `editor_changed` / `test_results` / `attempt_recorded` - Coding round
//! - `error` - Something went wrong
//! - `session_ended` - Teardown finished

use serde::Serialize;
use tokio::sync::broadcast;

use crate::coding::{CodingProblem, TestResult};
use crate::session::{EndReason, SessionSnapshot};
use crate::speech::SpeechCompletion;
use crate::stage::Stage;
use crate::transcript::{Feedback, Message};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedPayload {
    /// Current session state.
    pub session: SessionSnapshot,
}

/// Payload for the `stage_changed` event.
#[derive(Debug, Clone, Serialize)]
pub struct StageChangedPayload {
    /// Previous stage.
    pub from: Stage,
    /// New stage.
    pub to: Stage,
}

/// Payload for the `message_appended` event.
#[derive(Debug, Clone, Serialize)]
pub struct MessageAppendedPayload {
    /// Position in the transcript.
    pub index: usize,
    /// The message.
    pub message: Message,
}

/// Payload for the `feedback_attached` event.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackAttachedPayload {
    /// Transcript index of the answer.
    pub index: usize,
    /// The feedback.
    pub feedback: Feedback,
}

/// Payload for the `speech_started` event.
#[derive(Debug, Clone, Serialize)]
pub struct SpeechStartedPayload {
    /// What is being said.
    pub text: String,
}

/// Payload for the `speech_finished` event.
#[derive(Debug, Clone, Serialize)]
pub struct SpeechFinishedPayload {
    /// How playback ended.
    pub completion: SpeechCompletion,
}

/// Payload for the `transcript_draft` event.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptDraftPayload {
    /// Buffered capture text so far.
    pub text: String,
}

/// Payload for the `problem_opened` event.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemOpenedPayload {
    /// The new problem.
    pub problem: CodingProblem,
}

/// Payload for the `editor_changed` event.
#[derive(Debug, Clone, Serialize)]
pub struct EditorChangedPayload {
    /// Whether the code editor is open.
    pub open: bool,
}

/// Payload for the `test_results` event.
#[derive(Debug, Clone, Serialize)]
pub struct TestResultsPayload {
    /// One result per test case.
    pub results: Vec<TestResult>,
    /// Whether every case passed.
    pub passed: bool,
}

/// Payload for the `attempt_recorded` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecordedPayload {
    /// Problem title.
    pub title: String,
    /// Whether it was skipped.
    pub skipped: bool,
    /// Attempts recorded so far.
    pub attempts: u32,
    /// Attempts that complete the round.
    pub max_attempts: u32,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
    /// Whether the session carries on.
    pub transient: bool,
}

/// Payload for the `session_ended` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndedPayload {
    /// Why the session ended.
    pub reason: EndReason,
    /// Uploaded report location, for explicit ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events emitted by a session.
///
/// Serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(Box<ConnectedPayload>),
    /// The stage changed.
    StageChanged(StageChangedPayload),
    /// A transcript message was appended.
    MessageAppended(MessageAppendedPayload),
    /// Feedback was attached to an answer.
    FeedbackAttached(FeedbackAttachedPayload),
    /// The interviewer started speaking.
    SpeechStarted(SpeechStartedPayload),
    /// The interviewer stopped speaking.
    SpeechFinished(SpeechFinishedPayload),
    /// Live capture text changed.
    TranscriptDraft(TranscriptDraftPayload),
    /// A coding problem was opened.
    ProblemOpened(Box<ProblemOpenedPayload>),
    /// The code editor opened or closed.
    EditorChanged(EditorChangedPayload),
    /// A submission finished running.
    TestResults(TestResultsPayload),
    /// A coding attempt was recorded.
    AttemptRecorded(AttemptRecordedPayload),
    /// An error occurred.
    Error(ErrorPayload),
    /// The session ended.
    SessionEnded(SessionEndedPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub fn connected(session: SessionSnapshot) -> Self {
        Self::Connected(Box::new(ConnectedPayload { session }))
    }

    /// Creates a `StageChanged` event.
    #[must_use]
    pub const fn stage_changed(from: Stage, to: Stage) -> Self {
        Self::StageChanged(StageChangedPayload { from, to })
    }

    /// Creates a `MessageAppended` event.
    #[must_use]
    pub const fn message_appended(index: usize, message: Message) -> Self {
        Self::MessageAppended(MessageAppendedPayload { index, message })
    }

    /// Creates a `FeedbackAttached` event.
    #[must_use]
    pub const fn feedback_attached(index: usize, feedback: Feedback) -> Self {
        Self::FeedbackAttached(FeedbackAttachedPayload { index, feedback })
    }

    /// Creates a `SpeechStarted` event.
    #[must_use]
    pub fn speech_started(text: impl Into<String>) -> Self {
        Self::SpeechStarted(SpeechStartedPayload { text: text.into() })
    }

    /// Creates a `SpeechFinished` event.
    #[must_use]
    pub const fn speech_finished(completion: SpeechCompletion) -> Self {
        Self::SpeechFinished(SpeechFinishedPayload { completion })
    }

    /// Creates a `TranscriptDraft` event.
    #[must_use]
    pub const fn transcript_draft(text: String) -> Self {
        Self::TranscriptDraft(TranscriptDraftPayload { text })
    }

    /// Creates a `ProblemOpened` event.
    #[must_use]
    pub fn problem_opened(problem: CodingProblem) -> Self {
        Self::ProblemOpened(Box::new(ProblemOpenedPayload { problem }))
    }

    /// Creates an `EditorChanged` event.
    #[must_use]
    pub const fn editor_changed(open: bool) -> Self {
        Self::EditorChanged(EditorChangedPayload { open })
    }

    /// Creates a `TestResults` event.
    #[must_use]
    pub const fn test_results(results: Vec<TestResult>, passed: bool) -> Self {
        Self::TestResults(TestResultsPayload { results, passed })
    }

    /// Creates an `AttemptRecorded` event.
    #[must_use]
    pub const fn attempt_recorded(
        title: String,
        skipped: bool,
        attempts: u32,
        max_attempts: u32,
    ) -> Self {
        Self::AttemptRecorded(AttemptRecordedPayload {
            title,
            skipped,
            attempts,
            max_attempts,
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>, transient: bool) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
            transient,
        })
    }

    /// Creates a `SessionEnded` event.
    #[must_use]
    pub const fn session_ended(reason: EndReason, report_url: Option<String>) -> Self {
        Self::SessionEnded(SessionEndedPayload { reason, report_url })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::StageChanged(_) => "stage_changed",
            Self::MessageAppended(_) => "message_appended",
            Self::FeedbackAttached(_) => "feedback_attached",
            Self::SpeechStarted(_) => "speech_started",
            Self::SpeechFinished(_) => "speech_finished",
            Self::TranscriptDraft(_) => "transcript_draft",
            Self::ProblemOpened(_) => "problem_opened",
            Self::EditorChanged(_) => "editor_changed",
            Self::TestResults(_) => "test_results",
            Self::AttemptRecorded(_) => "attempt_recorded",
            Self::Error(_) => "error",
            Self::SessionEnded(_) => "session_ended",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to every subscriber.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster whose subscribers each buffer `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event. Returns the number of receivers.
    pub fn send(&self, event: SessionEvent) -> usize {
        // send() only fails when nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Heartbeat ping interval.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a single WebSocket connection.
///
/// - Sends `connected` with the current snapshot immediately
/// - Forwards all session events
/// - Pings every 30 seconds and closes after 3 missed pongs
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // subscribe before the snapshot so nothing between the two is lost
    let mut event_receiver = state.session.subscribe();
    let snapshot = state.session.snapshot().await;

    let connected_json = match serde_json::to_string(&SessionEvent::connected(snapshot)) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(WsMessage::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent session snapshot");

    let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(WsMessage::Text(_) | WsMessage::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(session_event) => {
                        let json = match serde_json::to_string(&session_event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(WsMessage::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Session event stream closed");
                        break;
                    }
                }
            }

            _ = heartbeat_interval.tick() => {
                if sender.send(WsMessage::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
