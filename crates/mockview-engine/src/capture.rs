//! Speech-to-text capture.
//!
//! Each capture is a single one-shot recognition session. Interim and final
//! transcripts are buffered and broadcast as drafts. When the recognizer
//! reports the end of the session a grace timer starts; when it fires the
//! buffered text is handed to the auto-submit channel and the buffer is
//! cleared. Starting a new capture cancels a pending grace timer and keeps
//! the buffered text, so a candidate who resumes speaking gets one combined
//! answer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{InterviewError, RecognitionError, Result};
use crate::websocket::{EventBroadcaster, SessionEvent};

/// Events produced by a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A provisional transcript for the current phrase.
    Interim(String),
    /// A settled transcript for the current phrase.
    Final(String),
    /// Recognition failed.
    Error(RecognitionError),
    /// The recognition session is over.
    Ended,
}

/// Platform speech recognition.
pub trait Recognizer: Send + Sync {
    /// Starts a one-shot recognition session.
    ///
    /// The returned channel yields events until the session ends; the sender
    /// being dropped counts as [`RecognitionEvent::Ended`].
    fn start(&self) -> std::result::Result<mpsc::UnboundedReceiver<RecognitionEvent>, RecognitionError>;

    /// Stops the active recognition session, if any.
    fn stop(&self);
}

#[derive(Debug, Default)]
struct CaptureState {
    finals: String,
    interim: String,
    listener: Option<JoinHandle<()>>,
    grace_timer: Option<JoinHandle<()>>,
}

impl CaptureState {
    fn draft(&self) -> String {
        join_phrases(&self.finals, &self.interim)
    }

    fn listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel_grace_timer(&mut self) {
        if let Some(timer) = self.grace_timer.take() {
            timer.abort();
        }
    }
}

fn join_phrases(a: &str, b: &str) -> String {
    match (a.trim(), b.trim()) {
        ("", b) => b.to_string(),
        (a, "") => a.to_string(),
        (a, b) => format!("{a} {b}"),
    }
}

struct CaptureInner {
    recognizer: Arc<dyn Recognizer>,
    grace: Duration,
    submit: mpsc::UnboundedSender<String>,
    events: EventBroadcaster,
    state: Mutex<CaptureState>,
}

impl CaptureInner {
    fn state(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Speech capture for one session.
pub struct SpeechCapture {
    inner: Arc<CaptureInner>,
}

impl SpeechCapture {
    /// Creates a capture that hands finished answers to `submit`.
    #[must_use]
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        grace: Duration,
        submit: mpsc::UnboundedSender<String>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            inner: Arc::new(CaptureInner {
                recognizer,
                grace,
                submit,
                events,
                state: Mutex::new(CaptureState::default()),
            }),
        }
    }

    /// Returns `true` while a recognition session is active.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.state().listening()
    }

    /// The current buffered text, including the interim phrase.
    #[must_use]
    pub fn draft(&self) -> String {
        self.inner.state().draft()
    }

    /// Starts a recognition session.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.state();
        if state.listening() {
            return Err(InterviewError::capture_rejected("already listening"));
        }
        state.cancel_grace_timer();

        let events = match self.inner.recognizer.start() {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "speech recognition failed to start");
                self.inner
                    .events
                    .send(SessionEvent::error(format!("speech recognition: {e}"), true));
                return Err(InterviewError::Recognition(e));
            }
        };

        let weak = Arc::downgrade(&self.inner);
        state.listener = Some(tokio::spawn(listen(weak, events)));
        info!("speech capture started");
        Ok(())
    }

    /// Stops recognition without discarding the buffer.
    pub fn stop(&self) {
        let mut state = self.inner.state();
        if let Some(listener) = state.listener.take() {
            listener.abort();
            self.inner.recognizer.stop();
        }
        state.cancel_grace_timer();
    }

    /// Stops recognition, cancels the grace timer and clears the buffer.
    pub fn reset(&self) {
        self.stop();
        let mut state = self.inner.state();
        state.finals.clear();
        state.interim.clear();
    }
}

impl std::fmt::Debug for SpeechCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechCapture")
            .field("grace", &self.inner.grace)
            .finish_non_exhaustive()
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn listen(weak: Weak<CaptureInner>, mut events: mpsc::UnboundedReceiver<RecognitionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = weak.upgrade() else { return };
        match event {
            RecognitionEvent::Interim(text) => {
                let draft = {
                    let mut state = inner.state();
                    state.interim = text;
                    state.draft()
                };
                inner.events.send(SessionEvent::transcript_draft(draft));
            }
            RecognitionEvent::Final(text) => {
                let draft = {
                    let mut state = inner.state();
                    state.finals = join_phrases(&state.finals, &text);
                    state.interim.clear();
                    state.draft()
                };
                inner.events.send(SessionEvent::transcript_draft(draft));
            }
            RecognitionEvent::Error(e) if e.is_ignorable() => {
                debug!(error = %e, "ignoring recognition error");
            }
            RecognitionEvent::Error(e) => {
                warn!(error = %e, "speech recognition failed");
                inner.recognizer.stop();
                {
                    let mut state = inner.state();
                    state.finals.clear();
                    state.interim.clear();
                }
                inner
                    .events
                    .send(SessionEvent::error(format!("speech recognition: {e}"), true));
                return;
            }
            RecognitionEvent::Ended => break,
        }
    }

    if let Some(inner) = weak.upgrade() {
        schedule_submit(&inner);
    }
}

fn schedule_submit(inner: &Arc<CaptureInner>) {
    let weak = Arc::downgrade(inner);
    let grace = inner.grace;
    let timer = tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let Some(inner) = weak.upgrade() else { return };
        let text = {
            let mut state = inner.state();
            state.grace_timer = None;
            let text = state.draft();
            state.finals.clear();
            state.interim.clear();
            text
        };
        if text.is_empty() {
            debug!("capture ended with nothing to submit");
            return;
        }
        info!(chars = text.len(), "auto-submitting captured answer");
        if inner.submit.send(text).is_err() {
            debug!("auto-submit receiver closed");
        }
    });

    let mut state = inner.state();
    state.cancel_grace_timer();
    state.grace_timer = Some(timer);
}
