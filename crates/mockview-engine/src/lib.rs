//! MockView Interview Engine
//!
//! Runs a live mock interview: stage progression, spoken turns with an
//! animated avatar, per-answer feedback, a coding round with remote test
//! execution, nervousness sampling and the end-of-session report. An HTTP
//! API and WebSocket event stream expose the session to a presentation layer.

pub mod affect;
pub mod api;
pub mod backend;
pub mod capture;
pub mod coding;
pub mod config;
pub mod error;
pub mod headless;
pub mod http;
pub mod media;
pub mod session;
pub mod speech;
pub mod stage;
pub mod transcript;
pub mod turn;
pub mod viseme;
pub mod websocket;

pub use affect::{AffectMonitor, AffectSettings, AffectStatsSnapshot};
pub use api::{create_router, AppState, ErrorResponse};
pub use backend::{
    AffectBackend, Backends, ExecutionBackend, ProblemBackend, ReportBackend, TextBackend,
};
pub use capture::{RecognitionEvent, Recognizer};
pub use coding::{AttemptProgress, CodingProblem, Language, SolvedProblemRecord, TestCase, TestResult};
pub use config::{AffectConfig, CodingConfig, Config, EndpointConfig, TimingConfig};
pub use error::{BackendKind, InterviewError, RecognitionError, Result};
pub use headless::headless_platform;
pub use http::HttpBackends;
pub use media::{Frame, FrameSource, MediaConstraints, MediaDevices, MediaStream};
pub use session::{
    EndReason, EndSummary, IgnoreReason, InterviewSession, Platform, SessionDeps, SessionSetup,
    SessionSnapshot, SubmissionOutcome, TurnOutcome,
};
pub use speech::{SpeechCompletion, Synthesizer, Utterance, Voice};
pub use stage::Stage;
pub use transcript::{Feedback, Message, Sender};
pub use viseme::{AvatarDriver, Viseme};
pub use websocket::{EventBroadcaster, SessionEvent};
