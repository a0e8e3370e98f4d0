//! Mouth-shape animation for the interviewer avatar.
//!
//! While an utterance plays, a ticker walks the text one character per
//! cadence tick and drives the avatar through a fixed letter-to-viseme table.
//! The ticker is not synchronised with audio.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::trace;

/// Mouth shapes understood by the avatar rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Viseme {
    /// Silence.
    #[serde(rename = "sil")]
    Sil,
    /// p, b, m
    #[serde(rename = "PP")]
    PP,
    /// f, v
    #[serde(rename = "FF")]
    FF,
    /// th
    #[serde(rename = "TH")]
    TH,
    /// t, d
    #[serde(rename = "DD")]
    DD,
    /// k, g
    #[serde(rename = "kk")]
    Kk,
    /// ch, j, sh
    #[serde(rename = "CH")]
    CH,
    /// s, z
    #[serde(rename = "SS")]
    SS,
    /// n, l
    #[serde(rename = "nn")]
    Nn,
    /// r
    #[serde(rename = "RR")]
    RR,
    /// a
    #[serde(rename = "aa")]
    Aa,
    /// e
    #[serde(rename = "E")]
    E,
    /// i
    #[serde(rename = "I")]
    I,
    /// o
    #[serde(rename = "O")]
    O,
    /// u
    #[serde(rename = "U")]
    U,
}

impl Viseme {
    /// Rig name of the shape.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sil => "sil",
            Self::PP => "PP",
            Self::FF => "FF",
            Self::TH => "TH",
            Self::DD => "DD",
            Self::Kk => "kk",
            Self::CH => "CH",
            Self::SS => "SS",
            Self::Nn => "nn",
            Self::RR => "RR",
            Self::Aa => "aa",
            Self::E => "E",
            Self::I => "I",
            Self::O => "O",
            Self::U => "U",
        }
    }

    /// Maps one character to a mouth shape. Anything unmapped is silence.
    #[must_use]
    pub fn for_char(c: char) -> Self {
        match c.to_ascii_lowercase() {
            'a' => Self::Aa,
            'e' => Self::E,
            'i' | 'y' => Self::I,
            'o' => Self::O,
            'u' | 'w' => Self::U,
            'p' | 'b' | 'm' => Self::PP,
            'f' | 'v' => Self::FF,
            't' | 'd' => Self::DD,
            'k' | 'g' | 'q' | 'c' | 'x' => Self::Kk,
            'j' | 'h' => Self::CH,
            's' | 'z' => Self::SS,
            'n' | 'l' => Self::Nn,
            'r' => Self::RR,
            _ => Self::Sil,
        }
    }
}

/// Drives the avatar's mouth.
pub trait AvatarDriver: Send + Sync {
    /// Sets the weight (0.0..=1.0) of one mouth shape.
    fn set_mouth_shape(&self, viseme: Viseme, weight: f32);

    /// Returns the mouth to its neutral pose.
    fn rest(&self);
}

/// A running viseme animation. Dropping it stops the animation.
#[derive(Debug)]
pub struct VisemeTicker {
    handle: JoinHandle<()>,
}

impl VisemeTicker {
    /// Starts animating `text` at one character per `cadence`.
    pub fn start(text: &str, cadence: Duration, avatar: Arc<dyn AvatarDriver>) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut previous: Option<Viseme> = None;

            for c in chars {
                ticker.tick().await;
                let viseme = Viseme::for_char(c);
                if let Some(prev) = previous.filter(|p| *p != viseme) {
                    avatar.set_mouth_shape(prev, 0.0);
                }
                trace!(viseme = viseme.name(), "viseme tick");
                avatar.set_mouth_shape(viseme, 1.0);
                previous = Some(viseme);
            }

            ticker.tick().await;
            avatar.rest();
        });
        Self { handle }
    }

    /// Returns `true` once every character has been shown.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the animation. The caller is responsible for resting the avatar.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for VisemeTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
