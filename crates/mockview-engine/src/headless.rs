//! Headless platform implementations.
//!
//! Used by the CLI and by tests to run a full session without a browser:
//! speech is simulated by word count, recognition ends immediately and the
//! avatar only traces its mouth shapes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace};

use crate::capture::{RecognitionEvent, Recognizer};
use crate::error::{InterviewError, RecognitionError, Result};
use crate::media::{Frame, FrameSource, MediaConstraints, MediaDevices, MediaStream};
use crate::session::Platform;
use crate::speech::{SpeechCompletion, Synthesizer, Utterance, Voice};
use crate::viseme::{AvatarDriver, Viseme};

/// Builds a headless [`Platform`] whose speech takes `per_word` per word.
#[must_use]
pub fn headless_platform(per_word: Duration) -> Platform {
    Platform {
        media: Arc::new(HeadlessMedia::default()),
        synthesizer: Arc::new(HeadlessSynthesizer::new(per_word)),
        recognizer: Arc::new(SilentRecognizer),
        avatar: Arc::new(TraceAvatar),
    }
}

// ============================================================================
// Speech
// ============================================================================

/// Simulates playback time proportional to the number of words.
#[derive(Debug, Default)]
pub struct HeadlessSynthesizer {
    per_word: Duration,
    cancelled: Notify,
}

impl HeadlessSynthesizer {
    /// Creates a synthesizer that takes `per_word` per spoken word.
    #[must_use]
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            cancelled: Notify::new(),
        }
    }
}

#[async_trait]
impl Synthesizer for HeadlessSynthesizer {
    async fn speak(&self, utterance: Utterance) -> SpeechCompletion {
        let words = u32::try_from(utterance.text.split_whitespace().count()).unwrap_or(u32::MAX);
        let duration = self.per_word.saturating_mul(words);
        if duration.is_zero() {
            return SpeechCompletion::Finished;
        }

        tokio::select! {
            () = tokio::time::sleep(duration) => SpeechCompletion::Finished,
            () = self.cancelled.notified() => SpeechCompletion::Interrupted,
        }
    }

    fn cancel(&self) {
        self.cancelled.notify_waiters();
    }

    fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("Headless", "en-US")]
    }
}

/// A recognizer that hears nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentRecognizer;

impl Recognizer for SilentRecognizer {
    fn start(&self) -> std::result::Result<mpsc::UnboundedReceiver<RecognitionEvent>, RecognitionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        // the receiver is still alive, so this cannot fail
        let _ = tx.send(RecognitionEvent::Ended);
        Ok(rx)
    }

    fn stop(&self) {}
}

/// An avatar that traces its mouth shapes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceAvatar;

impl AvatarDriver for TraceAvatar {
    fn set_mouth_shape(&self, viseme: Viseme, weight: f32) {
        trace!(viseme = viseme.name(), weight, "mouth shape");
    }

    fn rest(&self) {
        trace!("mouth at rest");
    }
}

// ============================================================================
// Media
// ============================================================================

/// Media devices that grant access (or refuse it) without hardware.
#[derive(Debug, Default, Clone)]
pub struct HeadlessMedia {
    deny: bool,
    frame: Option<String>,
}

impl HeadlessMedia {
    /// Media that refuses access.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            deny: true,
            frame: None,
        }
    }

    /// Media whose video track always shows `frame`.
    #[must_use]
    pub fn with_frame(frame: impl Into<String>) -> Self {
        Self {
            deny: false,
            frame: Some(frame.into()),
        }
    }
}

#[async_trait]
impl MediaDevices for HeadlessMedia {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<Box<dyn MediaStream>> {
        if self.deny {
            return Err(InterviewError::permission_denied(
                "camera and microphone access was refused",
            ));
        }
        debug!(?constraints, "headless media acquired");
        Ok(Box::new(HeadlessStream {
            stopped: Arc::new(AtomicBool::new(false)),
            frame: self.frame.clone(),
        }))
    }
}

/// A stream with no hardware behind it.
#[derive(Debug)]
pub struct HeadlessStream {
    stopped: Arc<AtomicBool>,
    frame: Option<String>,
}

impl MediaStream for HeadlessStream {
    fn stop_tracks(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!("headless media tracks stopped");
        }
    }

    fn frame_source(&self) -> Arc<dyn FrameSource> {
        Arc::new(StaticFrames {
            stopped: Arc::clone(&self.stopped),
            frame: self.frame.clone(),
        })
    }
}

struct StaticFrames {
    stopped: Arc<AtomicBool>,
    frame: Option<String>,
}

impl FrameSource for StaticFrames {
    fn capture_frame(&self) -> Option<Frame> {
        if self.stopped.load(Ordering::Acquire) {
            return None;
        }
        self.frame.as_deref().map(Frame::new)
    }
}
