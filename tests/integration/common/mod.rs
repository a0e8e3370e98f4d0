//! Scripted backends shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockview_engine::backend::{
    AffectRequest, AffectSampleRecord, AffectVerdict, CompletionRequest, ExecutionOutput,
    ExecutionRequest, ProblemRequest, SessionRecordPatch,
};
use mockview_engine::{
    headless_platform, AffectBackend, BackendKind, Backends, Config, ExecutionBackend,
    InterviewError, InterviewSession, Platform, ProblemBackend, ReportBackend, Result,
    SessionDeps, SessionSetup, TextBackend, TurnOutcome,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

/// Backend double for every service a session talks to.
#[derive(Default)]
pub struct ScriptedBackend {
    pub text_requests: Mutex<Vec<CompletionRequest>>,
    pub problem_requests: Mutex<Vec<ProblemRequest>>,
    pub executions: Mutex<Vec<ExecutionRequest>>,
    pub stored_samples: Mutex<Vec<AffectSampleRecord>>,
    pub uploads: Mutex<Vec<String>>,
    pub patches: Mutex<Vec<SessionRecordPatch>>,

    /// Makes executions print the wrong answer.
    pub failing_code: AtomicBool,
    /// Makes text generation fail.
    pub text_down: AtomicBool,
    /// Makes report upload fail.
    pub report_down: AtomicBool,
    /// Holds text generation until `release` is notified.
    pub hold_text: AtomicBool,
    /// Holds code execution until `release` is notified.
    pub hold_execution: AtomicBool,
    pub release: Notify,
    /// Detector verdict for every frame.
    pub nervous: AtomicBool,

    problems_served: AtomicUsize,
    questions_asked: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Text generation calls that were not feedback requests.
    pub fn interviewer_calls(&self) -> usize {
        self.text_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.system.contains("interview coach"))
            .count()
    }
}

#[async_trait]
impl TextBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let is_feedback = request.system.contains("interview coach");
        self.text_requests.lock().unwrap().push(request);

        if self.hold_text.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.text_down.load(Ordering::SeqCst) {
            return Err(InterviewError::network(BackendKind::TextGeneration, "HTTP 503"));
        }

        if is_feedback {
            return Ok("SUGGESTION: Mention a metric.\nEXAMPLE: I cut costs by 20%.".to_string());
        }
        let n = self.questions_asked.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("Thanks. Here is question number {n}, what did you learn?"))
    }
}

#[async_trait]
impl ProblemBackend for ScriptedBackend {
    async fn generate(&self, request: ProblemRequest) -> Result<Value> {
        self.problem_requests.lock().unwrap().push(request);
        let n = self.problems_served.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({
            "title": format!("Problem {n}"),
            "description": "Add the two numbers in the array.",
            "functionName": "add",
            "testCases": [
                { "input": "[1, 2]", "output": "3" },
                { "input": "[2, 2]", "output": "3" }
            ]
        }))
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutput> {
        self.executions.lock().unwrap().push(request);
        if self.hold_execution.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        let stdout = if self.failing_code.load(Ordering::SeqCst) {
            "4\n"
        } else {
            // trailing whitespace must not matter
            "3 \n"
        };
        Ok(ExecutionOutput {
            stdout: Some(stdout.to_string()),
            stderr: None,
        })
    }
}

#[async_trait]
impl AffectBackend for ScriptedBackend {
    async fn analyze(&self, request: AffectRequest) -> Result<AffectVerdict> {
        Ok(AffectVerdict {
            nervous: self.nervous.load(Ordering::SeqCst),
            score: 0.9,
            frame: Some(request.frame),
        })
    }

    async fn store(&self, record: AffectSampleRecord) -> Result<()> {
        self.stored_samples.lock().unwrap().push(record);
        Ok(())
    }
}

#[async_trait]
impl ReportBackend for ScriptedBackend {
    async fn upload_report(&self, session_id: &str, text: &str) -> Result<String> {
        if self.report_down.load(Ordering::SeqCst) {
            return Err(InterviewError::network(BackendKind::Report, "HTTP 500"));
        }
        self.uploads.lock().unwrap().push(text.to_string());
        Ok(format!("https://reports.test/{session_id}.txt"))
    }

    async fn patch_session(&self, _session_id: &str, patch: SessionRecordPatch) -> Result<()> {
        self.patches.lock().unwrap().push(patch);
        Ok(())
    }
}

pub fn setup(session_id: &str) -> SessionSetup {
    SessionSetup {
        session_id: session_id.to_string(),
        role: "Backend Engineer".to_string(),
        company_type: "Startup".to_string(),
    }
}

pub fn deps(backend: &Arc<ScriptedBackend>, platform: Platform) -> SessionDeps {
    SessionDeps {
        config: Config::default(),
        backends: Backends::uniform(Arc::clone(backend)),
        platform,
    }
}

/// Starts a session with instant headless speech and lets the greeting play.
pub async fn start_session(backend: &Arc<ScriptedBackend>) -> InterviewSession {
    let session =
        InterviewSession::start(setup("session-1"), deps(backend, headless_platform(Duration::ZERO)))
            .await
            .expect("session should start");
    settle().await;
    session
}

/// Lets the interviewer finish speaking, then answers.
pub async fn answer(session: &InterviewSession, text: &str) -> Result<TurnOutcome> {
    settle().await;
    session.submit_answer(text).await
}

/// Lets spawned tasks (speech, problem fetches) run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
