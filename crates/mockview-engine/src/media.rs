//! Camera and microphone access.
//!
//! The session is the sole owner of the [`MediaStream`]. Anything else that
//! needs video, such as the affect monitor, only receives the read-only
//! [`FrameSource`], which cannot stop tracks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// One still frame captured from the video track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encoded image, typically a `data:image/jpeg;base64,...` URL.
    pub data: String,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Creates a frame stamped with the current time.
    #[must_use]
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            captured_at: Utc::now(),
        }
    }
}

/// Which tracks to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    /// Request a camera track.
    pub video: bool,
    /// Request a microphone track.
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Platform camera/microphone access.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Requests the tracks.
    ///
    /// Returns [`crate::InterviewError::PermissionDenied`] when the user or
    /// the platform refuses.
    async fn acquire(&self, constraints: MediaConstraints) -> Result<Box<dyn MediaStream>>;
}

/// A live camera+microphone stream.
pub trait MediaStream: Send + Sync {
    /// Stops every track. Idempotent.
    fn stop_tracks(&self);

    /// Read-only access to video frames.
    fn frame_source(&self) -> Arc<dyn FrameSource>;
}

/// Read-only frame grabber.
pub trait FrameSource: Send + Sync {
    /// Captures the current frame, or `None` if no frame is available.
    fn capture_frame(&self) -> Option<Frame>;
}
