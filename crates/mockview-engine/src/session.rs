//! The interview session.
//!
//! [`InterviewSession`] owns everything a live interview needs: the media
//! stream, speech output and capture, the affect monitor, the stage machine,
//! the transcript and the coding round. It is created by [`InterviewSession::start`]
//! once camera and microphone access is granted and lives until
//! [`InterviewSession::end_session`] or until the last handle is dropped;
//! both paths run the same teardown.
//!
//! The lifecycle is irreversible: once started, a session only moves forward,
//! and a presentation layer must not return to a pre-session view without an
//! explicit end.
//!
//! # Concurrency
//!
//! - One interviewer turn at a time (guarded flag).
//! - One coding cycle at a time (guarded flag): problem fetches, executions
//!   and recorded attempts never interleave.
//! - Stage counters and the transcript are updated under one lock, so a
//!   transition check always sees the message that was just submitted.
//! - Background tasks hold weak references and check the `ended` flag before
//!   touching state, so late backend responses are discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use mockview_report::{ReportInput, TextReportGenerator};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::affect::{AffectMonitor, AffectSettings, AffectStatsSnapshot};
use crate::backend::{Backends, CompletionRequest, ProblemRequest, SessionRecordPatch};
use crate::capture::{Recognizer, SpeechCapture};
use crate::coding::{
    all_passed, parse_problem_payload, run_submission, AttemptProgress, CodingProblem, CodingRound,
    Language, SolvedProblemRecord, TestResult,
};
use crate::config::Config;
use crate::error::{BackendKind, InterviewError, Result};
use crate::media::{MediaConstraints, MediaDevices, MediaStream};
use crate::speech::{SpeechOutput, Synthesizer};
use crate::stage::{Stage, StageMachine, CLOSING_MESSAGE};
use crate::transcript::{Feedback, Message, Sender, Transcript};
use crate::turn::{feedback_request, greeting_request, parse_feedback, stage_instruction, truncate_words};
use crate::viseme::AvatarDriver;
use crate::websocket::{EventBroadcaster, SessionEvent};

// ============================================================================
// Public Types
// ============================================================================

/// Who is being interviewed, for what, and under which session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    /// Externally owned session id. Affect monitoring only runs when set.
    pub session_id: String,
    /// Role the candidate is interviewing for.
    pub role: String,
    /// Company type to simulate.
    pub company_type: String,
}

/// Platform capabilities a session drives.
#[derive(Clone)]
pub struct Platform {
    /// Camera and microphone.
    pub media: Arc<dyn MediaDevices>,
    /// Speech synthesis.
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Speech recognition.
    pub recognizer: Arc<dyn Recognizer>,
    /// Avatar mouth shapes.
    pub avatar: Arc<dyn AvatarDriver>,
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}

/// Everything [`InterviewSession::start`] needs besides the setup.
#[derive(Debug, Clone)]
pub struct SessionDeps {
    /// Engine configuration.
    pub config: Config,
    /// External services.
    pub backends: Backends,
    /// Platform capabilities.
    pub platform: Platform,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The candidate ended the interview; a report is generated.
    Explicit,
    /// The presentation layer navigated away.
    Navigation,
    /// The last session handle was dropped.
    Dropped,
}

/// Why a submission was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Nothing but whitespace was submitted.
    EmptyAnswer,
    /// Another turn is still being processed.
    TurnInFlight,
    /// The interviewer is still speaking.
    SpeechPlaying,
    /// The session has ended.
    SessionEnded,
}

/// Result of [`InterviewSession::submit_answer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Nothing happened.
    Ignored {
        /// Why.
        reason: IgnoreReason,
    },
    /// The stage advanced and its canned message was spoken.
    Advanced {
        /// Previous stage.
        from: Stage,
        /// New stage.
        to: Stage,
        /// The canned message.
        message: String,
    },
    /// The interviewer replied.
    Replied {
        /// Stage the reply belongs to.
        stage: Stage,
        /// The (truncated) reply.
        reply: String,
        /// Feedback attached to the answer, if the feedback call succeeded.
        #[serde(skip_serializing_if = "Option::is_none")]
        feedback: Option<Feedback>,
    },
}

impl IgnoreReason {
    /// Short explanation for the candidate.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::EmptyAnswer => "nothing was heard",
            Self::TurnInFlight => "the previous answer is still being processed",
            Self::SpeechPlaying => "the interviewer was still speaking",
            Self::SessionEnded => "the session has ended",
        }
    }
}

impl TurnOutcome {
    const fn ignored(reason: IgnoreReason) -> Self {
        Self::Ignored { reason }
    }
}

/// Result of [`InterviewSession::submit_code`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    /// Whether every test case passed.
    pub passed: bool,
    /// One result per test case.
    pub results: Vec<TestResult>,
    /// Set when the submission was recorded as an attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<AttemptProgress>,
}

/// Result of an explicit or implicit end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSummary {
    /// Why the session ended.
    pub reason: EndReason,
    /// Uploaded report location, for explicit ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    /// The generated report, for explicit ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session id.
    pub session_id: String,
    /// Role.
    pub role: String,
    /// Company type.
    pub company_type: String,
    /// Current stage.
    pub stage: Stage,
    /// Full transcript.
    pub transcript: Vec<Message>,
    /// Coding attempts recorded.
    pub attempts: u32,
    /// Attempts that complete the coding round.
    pub max_attempts: u32,
    /// Whether the code editor is open.
    pub editor_open: bool,
    /// The open coding problem.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_problem: Option<CodingProblem>,
    /// Coding round records.
    pub solved_problems: Vec<SolvedProblemRecord>,
    /// Whether the interviewer is speaking.
    pub speaking: bool,
    /// Whether speech capture is active.
    pub listening: bool,
    /// Affect monitor counters, when the monitor is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affect: Option<AffectStatsSnapshot>,
}

// ============================================================================
// Internals
// ============================================================================

/// Clears an atomic flag on drop.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock_sync<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SessionState {
    machine: StageMachine,
    transcript: Transcript,
    coding: CodingRound,
}

impl SessionState {
    /// Appends an AI message and counts it toward its stage.
    fn push_ai(&mut self, text: &str, stage: Stage, events: &EventBroadcaster) {
        let message = Message::new(Sender::Ai, text, stage);
        let index = self.transcript.push(message.clone());
        self.machine.record_ai_message(stage);
        events.send(SessionEvent::message_appended(index, message));
    }
}

/// Whether a problem fetch may replace an open problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchMode {
    /// The candidate asked for another problem.
    Replace,
    /// Automatic fetch; an already open problem is kept.
    KeepOpen,
}

enum TurnPlan {
    Advance {
        from: Stage,
        to: Stage,
        message: String,
    },
    Ask {
        stage: Stage,
        answer_index: usize,
        request: CompletionRequest,
        feedback: CompletionRequest,
    },
}

struct SessionInner {
    setup: SessionSetup,
    config: Config,
    backends: Backends,
    events: EventBroadcaster,
    speech: Arc<SpeechOutput>,
    capture: SpeechCapture,
    state: Mutex<SessionState>,
    turn_in_flight: AtomicBool,
    attempt_in_flight: AtomicBool,
    greeted: AtomicBool,
    ended: AtomicBool,
    media: std::sync::Mutex<Option<Box<dyn MediaStream>>>,
    affect: std::sync::Mutex<Option<AffectMonitor>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SessionInner {
    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = lock_sync(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    fn emit_error(&self, error: &InterviewError, transient: bool) {
        self.events.send(SessionEvent::error(error.to_string(), transient));
    }

    // ------------------------------------------------------------------------
    // Speech
    // ------------------------------------------------------------------------

    /// Speaks `text` in the background, then resumes capture.
    fn spawn_speech(self: &Arc<Self>, text: String) {
        let weak = Arc::downgrade(self);
        let speech = Arc::clone(&self.speech);
        let generation = speech.begin();
        self.events.send(SessionEvent::speech_started(text.clone()));

        self.track(tokio::spawn(async move {
            let completion = speech.speak_started(generation, &text).await;
            let Some(inner) = weak.upgrade() else { return };
            if inner.is_ended() {
                return;
            }
            debug!(?completion, "speech finished");
            inner.events.send(SessionEvent::speech_finished(completion));
            inner.resume_capture();
        }));
    }

    fn resume_capture(&self) {
        if self.is_ended()
            || self.speech.is_playing()
            || self.turn_in_flight.load(Ordering::Acquire)
            || self.capture.is_listening()
        {
            return;
        }
        if let Err(e) = self.capture.start() {
            debug!(error = %e, "could not resume speech capture");
        }
    }

    // ------------------------------------------------------------------------
    // Greeting
    // ------------------------------------------------------------------------

    async fn greet(self: &Arc<Self>) {
        if self.greeted.swap(true, Ordering::AcqRel) {
            return;
        }

        let request = greeting_request(&self.setup.role, &self.setup.company_type);
        let greeting = match self.backends.text.complete(request).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "greeting failed");
                self.emit_error(&e, true);
                return;
            }
        };
        if greeting.is_empty() || self.is_ended() {
            return;
        }

        {
            let mut state = self.state.lock().await;
            state.push_ai(&greeting, Stage::Intro, &self.events);
        }
        info!("greeted candidate");
        self.spawn_speech(greeting);
    }

    // ------------------------------------------------------------------------
    // Turns
    // ------------------------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    async fn submit_answer(self: &Arc<Self>, text: &str) -> Result<TurnOutcome> {
        let answer = text.trim();
        if answer.is_empty() {
            return Ok(TurnOutcome::ignored(IgnoreReason::EmptyAnswer));
        }
        if self.is_ended() {
            return Ok(TurnOutcome::ignored(IgnoreReason::SessionEnded));
        }
        if self.speech.is_playing() {
            return Ok(TurnOutcome::ignored(IgnoreReason::SpeechPlaying));
        }
        let Some(guard) = FlagGuard::acquire(&self.turn_in_flight) else {
            return Ok(TurnOutcome::ignored(IgnoreReason::TurnInFlight));
        };

        self.capture.reset();

        let plan = {
            let mut state = self.state.lock().await;
            if self.is_ended() {
                return Ok(TurnOutcome::ignored(IgnoreReason::SessionEnded));
            }
            let stage = state.machine.stage();
            let message = Message::new(Sender::User, answer, stage);
            let answer_index = state.transcript.push(message.clone());
            self.events
                .send(SessionEvent::message_appended(answer_index, message));

            match state.machine.due_transition() {
                Some(next) => {
                    state.machine.advance(next)?;
                    self.events.send(SessionEvent::stage_changed(stage, next));
                    let canned = next.entry_message().unwrap_or_default().to_string();
                    state.push_ai(&canned, next, &self.events);
                    TurnPlan::Advance {
                        from: stage,
                        to: next,
                        message: canned,
                    }
                }
                None => {
                    let question = state
                        .transcript
                        .last_ai_before(answer_index)
                        .map(|m| m.text.clone());
                    TurnPlan::Ask {
                        stage,
                        answer_index,
                        request: CompletionRequest {
                            system: stage_instruction(
                                stage,
                                &self.setup.role,
                                &self.setup.company_type,
                            ),
                            messages: state.transcript.to_chat_messages(),
                        },
                        feedback: feedback_request(question.as_deref(), answer, &self.setup.role),
                    }
                }
            }
        };

        match plan {
            TurnPlan::Advance { from, to, message } => {
                info!(%from, %to, "stage advanced");
                drop(guard);
                self.spawn_speech(message.clone());
                if to == Stage::Coding {
                    self.spawn_problem_fetch();
                }
                Ok(TurnOutcome::Advanced { from, to, message })
            }
            TurnPlan::Ask {
                stage,
                answer_index,
                request,
                feedback,
            } => {
                let (reply, feedback) = tokio::join!(
                    self.backends.text.complete(request),
                    self.request_feedback(feedback)
                );

                if self.is_ended() {
                    debug!("discarding reply that arrived after session end");
                    return Ok(TurnOutcome::ignored(IgnoreReason::SessionEnded));
                }

                let reply = match reply {
                    Ok(reply) => truncate_words(&reply, self.config.reply_word_limit),
                    Err(e) => {
                        warn!(error = %e, "interviewer turn failed");
                        self.emit_error(&e, true);
                        return Err(e);
                    }
                };
                if reply.is_empty() {
                    let e = InterviewError::network(BackendKind::TextGeneration, "empty reply");
                    self.emit_error(&e, true);
                    return Err(e);
                }

                {
                    let mut state = self.state.lock().await;
                    if self.is_ended() {
                        return Ok(TurnOutcome::ignored(IgnoreReason::SessionEnded));
                    }
                    if let Some(fb) = &feedback {
                        if state.transcript.attach_feedback(answer_index, fb.clone()) {
                            self.events
                                .send(SessionEvent::feedback_attached(answer_index, fb.clone()));
                        }
                    }
                    state.push_ai(&reply, stage, &self.events);
                }

                drop(guard);
                self.spawn_speech(reply.clone());
                Ok(TurnOutcome::Replied {
                    stage,
                    reply,
                    feedback,
                })
            }
        }
    }

    async fn request_feedback(&self, request: CompletionRequest) -> Option<Feedback> {
        match self.backends.text.complete(request).await {
            Ok(text) => Some(parse_feedback(&text)),
            Err(e) => {
                let e = match e {
                    InterviewError::NetworkFailure { message, .. } => {
                        InterviewError::network(BackendKind::Feedback, message)
                    }
                    other => other,
                };
                warn!(error = %e, "feedback request failed, continuing without feedback");
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Coding Round
    // ------------------------------------------------------------------------

    fn spawn_problem_fetch(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.track(tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else { return };
            if let Err(e) = inner.fetch_problem(FetchMode::KeepOpen).await {
                debug!(error = %e, "automatic problem fetch failed");
            }
        }));
    }

    /// Fetches and opens a problem. Holds the attempt slot for the whole
    /// fetch, so it never interleaves with an execution or a recorded attempt.
    async fn fetch_problem(&self, mode: FetchMode) -> Result<CodingProblem> {
        if self.is_ended() {
            return Err(InterviewError::SessionEnded);
        }
        let Some(_guard) = FlagGuard::acquire(&self.attempt_in_flight) else {
            return Err(InterviewError::AttemptInFlight);
        };

        let request = {
            let state = self.state.lock().await;
            let stage = state.machine.stage();
            if stage != Stage::Coding || state.coding.is_complete() {
                return Err(InterviewError::no_open_problem(stage));
            }
            if mode == FetchMode::KeepOpen {
                if let Some(open) = state.coding.current() {
                    debug!(title = %open.title, "problem already open, skipping fetch");
                    return Ok(open.clone());
                }
            }
            ProblemRequest {
                role: self.setup.role.clone(),
                company_type: self.setup.company_type.clone(),
                exclude: state.coding.seen_titles().to_vec(),
            }
        };

        let payload = match self.backends.problems.generate(request).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "problem generation failed");
                self.emit_error(&e, true);
                return Err(e);
            }
        };
        let problem = parse_problem_payload(&payload);

        let mut state = self.state.lock().await;
        if self.is_ended() {
            return Err(InterviewError::SessionEnded);
        }
        let stage = state.machine.stage();
        if stage != Stage::Coding || state.coding.is_complete() {
            return Err(InterviewError::no_open_problem(stage));
        }
        state.coding.open_problem(problem.clone());
        info!(title = %problem.title, tests = problem.test_cases.len(), "coding problem opened");
        self.events.send(SessionEvent::problem_opened(problem.clone()));
        self.events.send(SessionEvent::editor_changed(true));
        Ok(problem)
    }

    async fn set_editor(&self, open: bool) -> Result<()> {
        if self.is_ended() {
            return Err(InterviewError::SessionEnded);
        }
        let mut state = self.state.lock().await;
        let stage = state.machine.stage();
        if open {
            if stage != Stage::Coding || !state.coding.open_editor() {
                return Err(InterviewError::no_open_problem(stage));
            }
        } else {
            state.coding.close_editor();
        }
        self.events.send(SessionEvent::editor_changed(open));
        Ok(())
    }

    async fn current_problem(&self) -> Result<CodingProblem> {
        let state = self.state.lock().await;
        let stage = state.machine.stage();
        match state.coding.current() {
            Some(problem) if stage == Stage::Coding => Ok(problem.clone()),
            _ => Err(InterviewError::no_open_problem(stage)),
        }
    }

    async fn submit_code(self: &Arc<Self>, code: &str, language: Language) -> Result<SubmissionOutcome> {
        if self.is_ended() {
            return Err(InterviewError::SessionEnded);
        }
        let Some(_guard) = FlagGuard::acquire(&self.attempt_in_flight) else {
            return Err(InterviewError::AttemptInFlight);
        };

        let problem = self.current_problem().await?;
        info!(title = %problem.title, %language, "running submission");
        let results =
            run_submission(self.backends.execution.as_ref(), &problem, code, language).await;

        if self.is_ended() {
            return Err(InterviewError::SessionEnded);
        }
        let passed = all_passed(&results);
        self.events
            .send(SessionEvent::test_results(results.clone(), passed));

        if !passed {
            debug!(title = %problem.title, "submission failed, editor stays open");
            return Ok(SubmissionOutcome {
                passed,
                results,
                progress: None,
            });
        }

        let record = SolvedProblemRecord::solved(problem, code, results.clone());
        let progress = self.record_attempt(record).await?;
        Ok(SubmissionOutcome {
            passed,
            results,
            progress: Some(progress),
        })
    }

    async fn skip_current_problem(self: &Arc<Self>) -> Result<AttemptProgress> {
        if self.is_ended() {
            return Err(InterviewError::SessionEnded);
        }
        let Some(_guard) = FlagGuard::acquire(&self.attempt_in_flight) else {
            return Err(InterviewError::AttemptInFlight);
        };

        let problem = self.current_problem().await?;
        info!(title = %problem.title, "problem skipped");
        self.record_attempt(SolvedProblemRecord::skipped(problem))
            .await
    }

    /// Records an attempt and schedules the follow-up from the count it
    /// produced.
    async fn record_attempt(self: &Arc<Self>, record: SolvedProblemRecord) -> Result<AttemptProgress> {
        let title = record.problem().title.clone();
        let skipped = record.is_skipped();

        let progress = {
            let mut state = self.state.lock().await;
            if self.is_ended() {
                return Err(InterviewError::SessionEnded);
            }
            let progress = state.coding.record(record);
            if !state.coding.editor_open() {
                self.events.send(SessionEvent::editor_changed(false));
            }
            self.events.send(SessionEvent::attempt_recorded(
                title,
                skipped,
                progress.attempts,
                state.coding.max_attempts(),
            ));
            progress
        };

        info!(attempts = progress.attempts, complete = progress.round_complete, "coding attempt recorded");
        self.schedule_follow_up(progress);
        Ok(progress)
    }

    fn schedule_follow_up(self: &Arc<Self>, progress: AttemptProgress) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.config.timing.coding_advance_delay();

        self.track(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            if inner.is_ended() {
                return;
            }
            if progress.round_complete {
                inner.finish_coding_round().await;
            } else if let Err(e) = inner.fetch_problem(FetchMode::KeepOpen).await {
                debug!(error = %e, "follow-up problem fetch failed");
            }
        }));
    }

    async fn finish_coding_round(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if self.is_ended() || state.machine.stage() != Stage::Coding {
                return;
            }
            if let Err(e) = state.machine.advance(Stage::Final) {
                warn!(error = %e, "could not finish coding round");
                return;
            }
            self.events
                .send(SessionEvent::stage_changed(Stage::Coding, Stage::Final));
            state.push_ai(CLOSING_MESSAGE, Stage::Final, &self.events);
        }
        info!("coding round complete");
        self.spawn_speech(CLOSING_MESSAGE.to_string());
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Releases every resource. Returns `false` if already torn down.
    fn teardown(&self, reason: EndReason) -> bool {
        if self.ended.swap(true, Ordering::AcqRel) {
            return false;
        }
        info!(?reason, session_id = %self.setup.session_id, "tearing down session");

        self.speech.cancel();
        self.capture.reset();
        if let Some(monitor) = lock_sync(&self.affect).take() {
            monitor.stop();
        }
        if let Some(stream) = lock_sync(&self.media).take() {
            stream.stop_tracks();
        }
        for task in lock_sync(&self.tasks).drain(..) {
            task.abort();
        }
        true
    }

    async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        let stage = if self.is_ended() {
            Stage::Ended
        } else {
            state.machine.stage()
        };
        SessionSnapshot {
            session_id: self.setup.session_id.clone(),
            role: self.setup.role.clone(),
            company_type: self.setup.company_type.clone(),
            stage,
            transcript: state.transcript.messages().to_vec(),
            attempts: state.coding.attempts(),
            max_attempts: state.coding.max_attempts(),
            editor_open: state.coding.editor_open(),
            current_problem: state.coding.current().cloned(),
            solved_problems: state.coding.records().to_vec(),
            speaking: self.speech.is_playing(),
            listening: self.capture.is_listening(),
            affect: lock_sync(&self.affect).as_ref().map(AffectMonitor::stats),
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.teardown(EndReason::Dropped);
    }
}

// ============================================================================
// InterviewSession
// ============================================================================

/// Handle to a running interview. Cheap to clone; the session is torn down
/// when the last handle is dropped.
#[derive(Clone)]
pub struct InterviewSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for InterviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterviewSession")
            .field("session_id", &self.inner.setup.session_id)
            .field("ended", &self.inner.is_ended())
            .finish_non_exhaustive()
    }
}

impl InterviewSession {
    /// Acquires camera and microphone, starts background activity and greets
    /// the candidate.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::PermissionDenied` if media access is refused;
    /// nothing has been started at that point. A failed greeting is reported
    /// as an `error` event and does not fail the start.
    pub async fn start(setup: SessionSetup, deps: SessionDeps) -> Result<Self> {
        deps.config.validate()?;
        let SessionDeps {
            config,
            backends,
            platform,
        } = deps;

        let stream = platform
            .media
            .acquire(MediaConstraints::default())
            .await
            .map_err(|e| {
                warn!(error = %e, "media acquisition failed");
                e
            })?;
        let frames = stream.frame_source();

        let events = EventBroadcaster::default();
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let capture = SpeechCapture::new(
            platform.recognizer,
            config.timing.capture_grace(),
            submit_tx,
            events.clone(),
        );
        let speech = Arc::new(SpeechOutput::new(
            platform.synthesizer,
            platform.avatar,
            config.preferred_voices.clone(),
            config.timing.viseme_cadence(),
        ));

        let affect = (!setup.session_id.is_empty()).then(|| {
            AffectMonitor::spawn(
                AffectSettings {
                    session_id: setup.session_id.clone(),
                    interval: config.timing.affect_interval(),
                    threshold: config.affect.nervous_threshold,
                },
                frames,
                Arc::clone(&backends.affect),
            )
        });

        let inner = Arc::new(SessionInner {
            state: Mutex::new(SessionState {
                machine: StageMachine::new(),
                transcript: Transcript::new(),
                coding: CodingRound::new(config.coding.max_attempts),
            }),
            setup,
            config,
            backends,
            events,
            speech,
            capture,
            turn_in_flight: AtomicBool::new(false),
            attempt_in_flight: AtomicBool::new(false),
            greeted: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            media: std::sync::Mutex::new(Some(stream)),
            affect: std::sync::Mutex::new(affect),
            tasks: std::sync::Mutex::new(Vec::new()),
        });

        inner.track(tokio::spawn(auto_submit_pump(Arc::downgrade(&inner), submit_rx)));
        info!(
            session_id = %inner.setup.session_id,
            role = %inner.setup.role,
            company_type = %inner.setup.company_type,
            "interview session started"
        );

        inner.greet().await;
        Ok(Self { inner })
    }

    /// Session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.setup.session_id
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Submits a candidate answer.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::NetworkFailure` if the interviewer reply
    /// could not be generated; the answer stays in the transcript.
    pub async fn submit_answer(&self, text: &str) -> Result<TurnOutcome> {
        self.inner.submit_answer(text).await
    }

    /// Starts listening for a spoken answer.
    ///
    /// # Errors
    ///
    /// Returns `CaptureRejected` while a turn is in flight, speech is
    /// playing or capture is already active.
    pub fn start_capture(&self) -> Result<()> {
        if self.inner.is_ended() {
            return Err(InterviewError::SessionEnded);
        }
        if self.inner.turn_in_flight.load(Ordering::Acquire) {
            return Err(InterviewError::capture_rejected("a turn is being processed"));
        }
        if self.inner.speech.is_playing() {
            return Err(InterviewError::capture_rejected("the interviewer is speaking"));
        }
        self.inner.capture.start()
    }

    /// Opens the code editor on the current problem.
    pub async fn open_code_editor(&self) -> Result<()> {
        self.inner.set_editor(true).await
    }

    /// Closes the code editor.
    pub async fn close_code_editor(&self) -> Result<()> {
        self.inner.set_editor(false).await
    }

    /// Runs `code` against the current problem's test cases.
    ///
    /// A passing submission is recorded as an attempt; a failing one leaves
    /// the editor open and does not count.
    pub async fn submit_code(&self, code: &str, language: Language) -> Result<SubmissionOutcome> {
        self.inner.submit_code(code, language).await
    }

    /// Records the current problem as skipped.
    pub async fn skip_current_problem(&self) -> Result<AttemptProgress> {
        self.inner.skip_current_problem().await
    }

    /// Fetches a new problem and opens it, replacing any current one.
    ///
    /// # Errors
    ///
    /// Returns `AttemptInFlight` while a submission, skip or another fetch is
    /// running, and `NoOpenProblem` outside the coding stage or once the
    /// round is complete.
    pub async fn fetch_next_problem(&self) -> Result<CodingProblem> {
        self.inner.fetch_problem(FetchMode::Replace).await
    }

    /// Ends the session.
    ///
    /// Every reason runs the same teardown; an explicit end also uploads the
    /// report and patches the session record. Returns `Ok(None)` if the
    /// session had already ended.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::ReportUpload` if the report could not be
    /// submitted. The session is ended regardless.
    pub async fn end_session(&self, reason: EndReason) -> Result<Option<EndSummary>> {
        let inner = &self.inner;
        if !inner.teardown(reason) {
            return Ok(None);
        }

        let (input, messages, solved) = {
            let mut state = inner.state.lock().await;
            state.machine.end();
            let input = ReportInput {
                session_id: inner.setup.session_id.clone(),
                role: inner.setup.role.clone(),
                company_type: inner.setup.company_type.clone(),
                generated_at: Utc::now(),
                transcript: state.transcript.to_report_entries(),
                problems: state
                    .coding
                    .records()
                    .iter()
                    .map(SolvedProblemRecord::to_outcome)
                    .collect(),
            };
            (
                input,
                state.transcript.messages().to_vec(),
                state.coding.records().to_vec(),
            )
        };

        if reason != EndReason::Explicit {
            inner.events.send(SessionEvent::session_ended(reason, None));
            return Ok(Some(EndSummary {
                reason,
                report_url: None,
                report: None,
            }));
        }

        let report = TextReportGenerator::new(&input).generate();
        match submit_report(inner, &report, messages, solved).await {
            Ok(url) => {
                info!(report_url = %url, "interview report submitted");
                inner
                    .events
                    .send(SessionEvent::session_ended(reason, Some(url.clone())));
                Ok(Some(EndSummary {
                    reason,
                    report_url: Some(url),
                    report: Some(report),
                }))
            }
            Err(e) => {
                warn!(error = %e, "report submission failed");
                inner.emit_error(&e, false);
                inner.events.send(SessionEvent::session_ended(reason, None));
                Err(e)
            }
        }
    }

    /// Current stage.
    pub async fn stage(&self) -> Stage {
        if self.inner.is_ended() {
            return Stage::Ended;
        }
        self.inner.state.lock().await.machine.stage()
    }

    /// Copy of the transcript.
    pub async fn transcript(&self) -> Vec<Message> {
        self.inner.state.lock().await.transcript.messages().to_vec()
    }

    /// Serializable view of the session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot().await
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.is_ended()
    }
}

async fn submit_report(
    inner: &SessionInner,
    report: &str,
    messages: Vec<Message>,
    solved_problems: Vec<SolvedProblemRecord>,
) -> Result<String> {
    let session_id = &inner.setup.session_id;
    let report_url = inner
        .backends
        .report
        .upload_report(session_id, report)
        .await
        .map_err(|e| InterviewError::report_upload(e.to_string()))?;

    let patch = SessionRecordPatch {
        report_url: report_url.clone(),
        messages,
        solved_problems,
    };
    inner
        .backends
        .report
        .patch_session(session_id, patch)
        .await
        .map_err(|e| InterviewError::report_upload(e.to_string()))?;
    Ok(report_url)
}

async fn auto_submit_pump(weak: Weak<SessionInner>, mut answers: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = answers.recv().await {
        let Some(inner) = weak.upgrade() else { return };
        match inner.submit_answer(&text).await {
            Ok(TurnOutcome::Ignored { reason }) => {
                warn!(?reason, "spoken answer dropped");
                inner.events.send(SessionEvent::error(
                    format!("Your spoken answer was not submitted: {}", reason.describe()),
                    true,
                ));
            }
            Ok(outcome) => debug!(?outcome, "auto-submitted answer"),
            // the turn already reported the failure
            Err(e) => warn!(error = %e, "auto-submitted answer failed"),
        }
    }
}
