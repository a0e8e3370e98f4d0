//! Text-to-speech output.
//!
//! [`SpeechOutput`] wraps a platform [`Synthesizer`]: it cancels whatever is
//! playing, picks a voice, animates the avatar while the utterance plays and
//! reports how playback ended.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::viseme::{AvatarDriver, VisemeTicker};

/// A voice offered by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Display name, e.g. "Google US English".
    pub name: String,
    /// BCP 47 language tag, e.g. "en-US".
    pub lang: String,
}

impl Voice {
    /// Creates a voice descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// Something to say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// The text.
    pub text: String,
    /// Chosen voice; `None` means the platform default.
    pub voice: Option<Voice>,
}

/// How playback of an utterance ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SpeechCompletion {
    /// Played to the end.
    Finished,
    /// Cancelled before the end.
    Interrupted,
    /// The synthesizer failed.
    Error(String),
}

/// Platform speech synthesis.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Plays an utterance and resolves when playback ends for any reason.
    async fn speak(&self, utterance: Utterance) -> SpeechCompletion;

    /// Stops the current utterance, if any.
    fn cancel(&self);

    /// Voices currently available.
    fn voices(&self) -> Vec<Voice>;
}

/// Picks a voice: the first available preferred name, then any English
/// voice, then the first voice. `None` leaves the choice to the platform.
#[must_use]
pub fn select_voice(voices: &[Voice], preferred: &[String]) -> Option<Voice> {
    preferred
        .iter()
        .find_map(|name| voices.iter().find(|v| v.name.contains(name.as_str())))
        .or_else(|| {
            voices
                .iter()
                .find(|v| v.lang.to_ascii_lowercase().starts_with("en"))
        })
        .or_else(|| voices.first())
        .cloned()
}

/// Speech output for one session.
pub struct SpeechOutput {
    synthesizer: Arc<dyn Synthesizer>,
    avatar: Arc<dyn AvatarDriver>,
    preferred_voices: Vec<String>,
    cadence: Duration,
    playing: AtomicBool,
    generation: AtomicU64,
}

impl SpeechOutput {
    /// Creates the output.
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        avatar: Arc<dyn AvatarDriver>,
        preferred_voices: Vec<String>,
        cadence: Duration,
    ) -> Self {
        Self {
            synthesizer,
            avatar,
            preferred_voices,
            cadence,
            playing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns `true` while an utterance is playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Speaks `text`, interrupting anything already playing.
    pub async fn speak(&self, text: &str) -> SpeechCompletion {
        let generation = self.begin();
        self.speak_started(generation, text).await
    }

    /// Interrupts anything already playing and marks playback as started.
    ///
    /// Returns the generation to hand to [`SpeechOutput::speak_started`].
    /// Callers that play in a background task call this first, so the
    /// playing flag is set before the task is polled.
    #[must_use]
    pub fn begin(&self) -> u64 {
        self.synthesizer.cancel();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.playing.store(true, Ordering::Release);
        generation
    }

    /// Plays `text` for a generation obtained from [`SpeechOutput::begin`].
    ///
    /// Returns `Interrupted` without playing if a newer utterance or a
    /// cancel has superseded `generation` in the meantime.
    pub async fn speak_started(&self, generation: u64, text: &str) -> SpeechCompletion {
        if self.generation.load(Ordering::Acquire) != generation {
            return SpeechCompletion::Interrupted;
        }

        let voice = select_voice(&self.synthesizer.voices(), &self.preferred_voices);
        debug!(voice = ?voice.as_ref().map(|v| &v.name), chars = text.len(), "speaking");

        let ticker = VisemeTicker::start(text, self.cadence, Arc::clone(&self.avatar));
        let completion = self
            .synthesizer
            .speak(Utterance {
                text: text.to_string(),
                voice,
            })
            .await;
        ticker.stop();

        // a newer utterance owns the playing flag and the avatar
        if self.generation.load(Ordering::Acquire) == generation {
            self.playing.store(false, Ordering::Release);
            self.avatar.rest();
        }
        completion
    }

    /// Stops playback and rests the avatar.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.synthesizer.cancel();
        self.playing.store(false, Ordering::Release);
        self.avatar.rest();
    }
}

impl std::fmt::Debug for SpeechOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechOutput")
            .field("playing", &self.is_playing())
            .field("cadence", &self.cadence)
            .finish_non_exhaustive()
    }
}
