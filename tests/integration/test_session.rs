//! Integration tests for complete interview sessions.
//!
//! These tests drive a session end to end against scripted backends and the
//! headless platform: stage progression, the coding round, speech capture,
//! affect sampling and the end-of-session report.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{answer, deps, settle, setup, start_session, ScriptedBackend};
use mockview_engine::headless::HeadlessMedia;
use mockview_engine::stage::{CLOSING_MESSAGE, CODING_MESSAGE, TECHNICAL_MESSAGE, TRANSITION_MESSAGE};
use mockview_engine::{
    headless_platform, EndReason, IgnoreReason, InterviewError, InterviewSession, Language,
    RecognitionError, RecognitionEvent, Recognizer, Sender, SessionEvent, Stage, TurnOutcome,
};
use tokio::sync::mpsc;

const SOLUTION: &str = "function add(nums) { return nums[0] + nums[1]; }";

/// Answers until the session enters the coding stage.
async fn reach_coding(session: &InterviewSession) {
    for i in 0..7 {
        answer(&session, &format!("Answer number {i}"))
            .await
            .expect("turn should succeed");
    }
    assert_eq!(session.stage().await, Stage::Coding);
    settle().await;
}

// ============================================================================
// Stage Progression Tests
// ============================================================================

/// Tests the greeting and every count-driven transition.
#[tokio::test(start_paused = true)]
async fn test_stage_progression_to_coding() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;

    assert_eq!(session.stage().await, Stage::Intro);
    assert_eq!(backend.interviewer_calls(), 1);
    let transcript = session.transcript().await;
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].sender, Sender::Ai);
    assert_eq!(transcript[0].stage, Stage::Intro);

    // greeting counts as the first intro message
    let outcome = answer(&session, "I have five years of backend experience.")
        .await
        .unwrap();
    assert!(
        matches!(outcome, TurnOutcome::Replied { stage: Stage::Intro, feedback: Some(_), .. }),
        "unexpected outcome: {outcome:?}"
    );
    assert_eq!(backend.interviewer_calls(), 2);

    let outcome = answer(&session, "Mostly Rust and Go.").await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Advanced {
            from: Stage::Intro,
            to: Stage::Transition,
            message: TRANSITION_MESSAGE.to_string(),
        }
    );
    // canned transition messages never call the text backend
    assert_eq!(backend.interviewer_calls(), 2);

    let outcome = answer(&session, "A payments migration.").await.unwrap();
    assert!(matches!(
        outcome,
        TurnOutcome::Advanced { from: Stage::Transition, to: Stage::Technical, .. }
    ));

    for _ in 0..3 {
        let outcome = answer(&session, "Consistent hashing.").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Replied { stage: Stage::Technical, .. }));
    }

    let outcome = answer(&session, "Backpressure.").await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Advanced {
            from: Stage::Technical,
            to: Stage::Coding,
            message: CODING_MESSAGE.to_string(),
        }
    );
    assert_eq!(backend.interviewer_calls(), 5);

    let transcript = session.transcript().await;
    let technical_entry = transcript
        .iter()
        .find(|m| m.text == TECHNICAL_MESSAGE)
        .unwrap();
    assert_eq!(technical_entry.stage, Stage::Technical);
    assert_eq!(technical_entry.sender, Sender::Ai);

    // entering coding fetches the first problem
    settle().await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.current_problem.unwrap().title, "Problem 1");
    assert!(snapshot.editor_open);
}

/// Tests that feedback targets the submitted answer with the prior question.
#[tokio::test(start_paused = true)]
async fn test_feedback_attached_to_answer() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    let greeting = session.transcript().await[0].text.clone();

    answer(&session, "I like building APIs.").await.unwrap();

    let transcript = session.transcript().await;
    assert_eq!(transcript.len(), 3);
    let feedback = transcript[1].feedback.as_ref().unwrap();
    assert_eq!(feedback.suggestion, "Mention a metric.");
    assert_eq!(feedback.example, "I cut costs by 20%.");
    assert!(transcript[2].feedback.is_none());

    let requests = backend.text_requests.lock().unwrap();
    let feedback_request = requests
        .iter()
        .find(|r| r.system.contains("interview coach"))
        .unwrap();
    let content = &feedback_request.messages[0].content;
    assert!(content.contains(&greeting));
    assert!(content.contains("I like building APIs."));
}

/// Tests that a failed interviewer turn keeps the answer and can be retried.
#[tokio::test(start_paused = true)]
async fn test_text_backend_failure_is_reported_and_recoverable() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    let mut events = session.subscribe();

    backend.text_down.store(true, Ordering::SeqCst);
    let err = answer(&session, "First answer").await.unwrap_err();
    assert!(matches!(err, InterviewError::NetworkFailure { .. }));
    assert_eq!(session.transcript().await.len(), 2);

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Error(payload) = event {
            assert!(payload.transient);
            saw_error = true;
        }
    }
    assert!(saw_error);

    backend.text_down.store(false, Ordering::SeqCst);
    let outcome = answer(&session, "Second try").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Replied { stage: Stage::Intro, .. }));
}

// ============================================================================
// Concurrency Tests
// ============================================================================

/// Tests that one turn runs at a time and late replies are discarded.
#[tokio::test(start_paused = true)]
async fn test_turn_in_flight_and_late_reply_discarded() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;

    backend.hold_text.store(true, Ordering::SeqCst);
    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.submit_answer("Slow answer").await })
    };
    settle().await;

    let outcome = answer(&session, "Impatient answer").await.unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Ignored {
            reason: IgnoreReason::TurnInFlight
        }
    );
    assert!(matches!(
        session.start_capture(),
        Err(InterviewError::CaptureRejected { .. })
    ));

    session.end_session(EndReason::Navigation).await.unwrap();
    backend.release.notify_waiters();

    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        TurnOutcome::Ignored {
            reason: IgnoreReason::SessionEnded
        }
    );
    let transcript = session.transcript().await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].sender, Sender::User);
}

/// Tests that answers and capture are rejected while the interviewer speaks.
#[tokio::test(start_paused = true)]
async fn test_answer_while_interviewer_speaks_is_ignored() {
    let backend = ScriptedBackend::new();
    let platform = headless_platform(Duration::from_secs(1));
    let session = InterviewSession::start(setup("session-1"), deps(&backend, platform))
        .await
        .unwrap();

    // the greeting is still playing when start returns
    assert!(session.snapshot().await.speaking);
    assert_eq!(
        session.submit_answer("Answer during the greeting").await.unwrap(),
        TurnOutcome::Ignored {
            reason: IgnoreReason::SpeechPlaying
        }
    );
    assert!(matches!(
        session.start_capture(),
        Err(InterviewError::CaptureRejected { .. })
    ));
    assert_eq!(backend.interviewer_calls(), 1);
    assert_eq!(session.transcript().await.len(), 1);

    // ten words at one second each
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert!(!session.snapshot().await.speaking);
    let outcome = session.submit_answer("I write Rust.").await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Replied { .. }));

    // the reply is spoken without interruption
    assert_eq!(
        session.submit_answer("And some Go.").await.unwrap(),
        TurnOutcome::Ignored {
            reason: IgnoreReason::SpeechPlaying
        }
    );
    assert_eq!(backend.interviewer_calls(), 2);
}

// ============================================================================
// Coding Round Tests
// ============================================================================

/// Tests a full coding round: a failed run, a solve, a skip and the final solve.
#[tokio::test(start_paused = true)]
async fn test_coding_round_completes_after_three_attempts() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    reach_coding(&session).await;

    // failing runs do not count and keep the editor open
    backend.failing_code.store(true, Ordering::SeqCst);
    let outcome = session
        .submit_code(SOLUTION, Language::JavaScript)
        .await
        .unwrap();
    assert!(!outcome.passed);
    assert!(outcome.progress.is_none());
    assert_eq!(outcome.results.len(), 2);
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.attempts, 0);
    assert!(snapshot.editor_open);

    // trailing whitespace in the output is ignored
    backend.failing_code.store(false, Ordering::SeqCst);
    let outcome = session
        .submit_code(SOLUTION, Language::JavaScript)
        .await
        .unwrap();
    assert!(outcome.passed);
    let progress = outcome.progress.unwrap();
    assert_eq!(progress.attempts, 1);
    assert!(!progress.round_complete);

    let snapshot = session.snapshot().await;
    assert!(!snapshot.editor_open);
    assert!(snapshot.current_problem.is_none());

    tokio::time::sleep(Duration::from_millis(1600)).await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.current_problem.unwrap().title, "Problem 2");
    {
        let requests = backend.problem_requests.lock().unwrap();
        assert_eq!(requests[1].exclude, vec!["Problem 1".to_string()]);
        assert_eq!(requests[1].role, "Backend Engineer");
    }

    let progress = session.skip_current_problem().await.unwrap();
    assert_eq!(progress.attempts, 2);
    tokio::time::sleep(Duration::from_millis(1600)).await;

    let outcome = session
        .submit_code(SOLUTION, Language::JavaScript)
        .await
        .unwrap();
    assert!(outcome.progress.unwrap().round_complete);

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(session.stage().await, Stage::Final);
    let transcript = session.transcript().await;
    let last = transcript.last().unwrap();
    assert_eq!(last.text, CLOSING_MESSAGE);
    assert_eq!(last.stage, Stage::Final);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.solved_problems.len(), 3);
    assert!(snapshot.solved_problems[1].is_skipped());
    assert!(snapshot.solved_problems[1].user_code().is_none());
    assert_eq!(snapshot.solved_problems[0].user_code(), Some(SOLUTION));

    let err = session
        .submit_code(SOLUTION, Language::JavaScript)
        .await
        .unwrap_err();
    assert!(matches!(err, InterviewError::NoOpenProblem { .. }));

    // every execution wraps the candidate code with a call to the function
    let executions = backend.executions.lock().unwrap();
    assert!(executions.iter().all(|e| e.language == "javascript"));
    assert!(executions[0].code.contains("add([1, 2])"));
}

/// Tests that a manual fetch during the follow-up delay is not replaced.
#[tokio::test(start_paused = true)]
async fn test_fetch_during_follow_up_keeps_one_problem() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    reach_coding(&session).await;

    let outcome = session
        .submit_code(SOLUTION, Language::JavaScript)
        .await
        .unwrap();
    assert_eq!(outcome.progress.unwrap().attempts, 1);

    let fetched = session.fetch_next_problem().await.unwrap();
    assert_eq!(fetched.title, "Problem 2");

    tokio::time::sleep(Duration::from_millis(1600)).await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.current_problem.unwrap().title, "Problem 2");
    assert!(snapshot.editor_open);
    assert_eq!(snapshot.attempts, 1);
    assert_eq!(backend.problem_requests.lock().unwrap().len(), 2);
}

/// Tests that a fetch cannot replace a problem while its submission runs.
#[tokio::test(start_paused = true)]
async fn test_fetch_rejected_while_submission_runs() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    reach_coding(&session).await;

    backend.hold_execution.store(true, Ordering::SeqCst);
    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.submit_code(SOLUTION, Language::JavaScript).await })
    };
    settle().await;

    assert!(matches!(
        session.fetch_next_problem().await,
        Err(InterviewError::AttemptInFlight)
    ));
    assert!(matches!(
        session.skip_current_problem().await,
        Err(InterviewError::AttemptInFlight)
    ));

    backend.hold_execution.store(false, Ordering::SeqCst);
    backend.release.notify_waiters();
    let outcome = pending.await.unwrap().unwrap();
    assert!(outcome.passed);
    assert_eq!(outcome.progress.unwrap().attempts, 1);

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.solved_problems[0].problem().title, "Problem 1");
    assert!(snapshot.current_problem.is_none());
    assert_eq!(backend.problem_requests.lock().unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(
        session.snapshot().await.current_problem.unwrap().title,
        "Problem 2"
    );
}

/// Tests that coding operations are rejected outside the coding stage.
#[tokio::test(start_paused = true)]
async fn test_coding_operations_require_open_problem() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;

    assert!(matches!(
        session.skip_current_problem().await,
        Err(InterviewError::NoOpenProblem { .. })
    ));
    assert!(matches!(
        session.open_code_editor().await,
        Err(InterviewError::NoOpenProblem { .. })
    ));
    assert!(matches!(
        session.fetch_next_problem().await,
        Err(InterviewError::NoOpenProblem { .. })
    ));
    assert!(backend.problem_requests.lock().unwrap().is_empty());
}

// ============================================================================
// Speech Capture Tests
// ============================================================================

/// Plays one scripted recognition session per start.
struct ScriptedRecognizer {
    scripts: Mutex<Vec<Vec<RecognitionEvent>>>,
}

impl Recognizer for ScriptedRecognizer {
    fn start(&self) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, RecognitionError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| vec![RecognitionEvent::Ended]);
        let (tx, rx) = mpsc::unbounded_channel();
        for event in script {
            tx.send(event).unwrap();
        }
        Ok(rx)
    }

    fn stop(&self) {}
}

/// Tests that capture resumes after the greeting and auto-submits after the
/// grace period.
#[tokio::test(start_paused = true)]
async fn test_spoken_answer_is_auto_submitted() {
    let backend = ScriptedBackend::new();
    let mut platform = headless_platform(Duration::ZERO);
    platform.recognizer = Arc::new(ScriptedRecognizer {
        scripts: Mutex::new(vec![vec![
            RecognitionEvent::Interim("I love".to_string()),
            RecognitionEvent::Final("I love distributed systems".to_string()),
            RecognitionEvent::Ended,
        ]]),
    });
    let session = InterviewSession::start(setup("session-1"), deps(&backend, platform))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(session.transcript().await.len(), 1);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let transcript = session.transcript().await;
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[1].sender, Sender::User);
    assert_eq!(transcript[1].text, "I love distributed systems");
    assert_eq!(transcript[2].sender, Sender::Ai);
}

/// Hands recognition events to whichever capture session is listening.
#[derive(Default)]
struct ManualRecognizer {
    listener: Mutex<Option<mpsc::UnboundedSender<RecognitionEvent>>>,
}

impl ManualRecognizer {
    fn say(&self, events: Vec<RecognitionEvent>) {
        let listener = self.listener.lock().unwrap();
        let tx = listener.as_ref().expect("capture should be listening");
        for event in events {
            tx.send(event).unwrap();
        }
    }
}

impl Recognizer for ManualRecognizer {
    fn start(&self) -> Result<mpsc::UnboundedReceiver<RecognitionEvent>, RecognitionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.listener.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        self.listener.lock().unwrap().take();
    }
}

/// Tests that a spoken answer arriving during the closing message is reported
/// instead of silently dropped.
#[tokio::test(start_paused = true)]
async fn test_dropped_spoken_answer_is_reported() {
    let backend = ScriptedBackend::new();
    let recognizer = Arc::new(ManualRecognizer::default());
    let mut platform = headless_platform(Duration::from_secs(1));
    platform.recognizer = recognizer.clone();
    let mut deps = deps(&backend, platform);
    deps.config.coding.max_attempts = 1;
    let session = InterviewSession::start(setup("session-1"), deps)
        .await
        .unwrap();

    for i in 0..7 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        session
            .submit_answer(&format!("Answer number {i}"))
            .await
            .unwrap();
    }
    // the coding message has been spoken and capture resumed
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(session.stage().await, Stage::Coding);
    assert!(session.snapshot().await.listening);

    let mut events = session.subscribe();
    let progress = session.skip_current_problem().await.unwrap();
    assert!(progress.round_complete);
    recognizer.say(vec![
        RecognitionEvent::Final("I would add caching".to_string()),
        RecognitionEvent::Ended,
    ]);

    // closing message starts at 1.5 s, the grace period ends at 3 s
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(session.stage().await, Stage::Final);
    assert!(session.snapshot().await.speaking);

    let mut reported = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Error(payload) = event {
            assert!(payload.transient);
            assert!(payload.message.contains("interviewer was still speaking"));
            reported = true;
        }
    }
    assert!(reported);
    assert!(!session
        .transcript()
        .await
        .iter()
        .any(|m| m.text == "I would add caching"));
}

// ============================================================================
// Affect Monitoring Tests
// ============================================================================

/// Tests that nervous frames are stored and sampling stops at end.
#[tokio::test(start_paused = true)]
async fn test_affect_samples_stored_until_end() {
    let backend = ScriptedBackend::new();
    backend.nervous.store(true, Ordering::SeqCst);
    let mut platform = headless_platform(Duration::ZERO);
    platform.media = Arc::new(HeadlessMedia::with_frame("data:image/jpeg;base64,AAAA"));
    let session = InterviewSession::start(setup("session-9"), deps(&backend, platform))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(4100)).await;
    {
        let stored = backend.stored_samples.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].session_id, "session-9");
        assert_eq!(stored[0].frame, "data:image/jpeg;base64,AAAA");
    }
    assert_eq!(session.snapshot().await.affect.unwrap().samples_stored, 1);

    session.end_session(EndReason::Navigation).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(backend.stored_samples.lock().unwrap().len(), 1);
}

/// Tests that no monitor runs without a session id.
#[tokio::test(start_paused = true)]
async fn test_no_affect_monitor_without_session_id() {
    let backend = ScriptedBackend::new();
    let session =
        InterviewSession::start(setup(""), deps(&backend, headless_platform(Duration::ZERO)))
            .await
            .unwrap();
    assert!(session.snapshot().await.affect.is_none());
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

/// Tests that refused media access fails the start.
#[tokio::test]
async fn test_permission_denied() {
    let backend = ScriptedBackend::new();
    let mut platform = headless_platform(Duration::ZERO);
    platform.media = Arc::new(HeadlessMedia::denied());

    let err = InterviewSession::start(setup("session-1"), deps(&backend, platform))
        .await
        .unwrap_err();
    assert!(matches!(err, InterviewError::PermissionDenied { .. }));
    assert!(backend.text_requests.lock().unwrap().is_empty());
}

/// Tests that an explicit end uploads the report exactly once.
#[tokio::test(start_paused = true)]
async fn test_explicit_end_uploads_report_once() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;
    answer(&session, "I build payment systems.").await.unwrap();

    let summary = session
        .end_session(EndReason::Explicit)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        summary.report_url.as_deref(),
        Some("https://reports.test/session-1.txt")
    );
    let report = summary.report.unwrap();
    assert!(report.contains("Role: Backend Engineer"));
    assert!(report.contains("I build payment systems."));

    assert!(session.end_session(EndReason::Explicit).await.unwrap().is_none());
    assert!(session.end_session(EndReason::Navigation).await.unwrap().is_none());
    assert_eq!(backend.uploads.lock().unwrap().len(), 1);

    let patches = backend.patches.lock().unwrap();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].report_url, "https://reports.test/session-1.txt");
    assert_eq!(patches[0].messages.len(), 3);

    assert_eq!(session.stage().await, Stage::Ended);
    assert_eq!(
        answer(&session, "Hello?").await.unwrap(),
        TurnOutcome::Ignored {
            reason: IgnoreReason::SessionEnded
        }
    );
}

/// Tests that navigating away ends without a report.
#[tokio::test(start_paused = true)]
async fn test_navigation_end_skips_report() {
    let backend = ScriptedBackend::new();
    let session = start_session(&backend).await;

    let summary = session
        .end_session(EndReason::Navigation)
        .await
        .unwrap()
        .unwrap();
    assert!(summary.report_url.is_none());
    assert!(backend.uploads.lock().unwrap().is_empty());
    assert!(session.is_ended());
}

/// Tests that a failed upload still ends the session.
#[tokio::test(start_paused = true)]
async fn test_report_upload_failure() {
    let backend = ScriptedBackend::new();
    backend.report_down.store(true, Ordering::SeqCst);
    let session = start_session(&backend).await;

    let err = session.end_session(EndReason::Explicit).await.unwrap_err();
    assert!(matches!(err, InterviewError::ReportUpload { .. }));
    assert!(session.is_ended());
    assert!(session.end_session(EndReason::Explicit).await.unwrap().is_none());
    assert!(backend.patches.lock().unwrap().is_empty());
}
