//! Interview stage state machine.
//!
//! A session moves strictly forward through
//! `intro -> transition -> technical -> coding -> final`, one step at a time.
//! `ended` is reachable from any stage, but only through an explicit end or
//! teardown. Automatic transitions are decided from per-stage AI message
//! counts, which are kept in [`StageCounters`] and updated in the same critical
//! section that appends messages to the transcript.

use serde::{Deserialize, Serialize};

use crate::error::{InterviewError, Result};

// ============================================================================
// Canned Messages
// ============================================================================

/// Spoken when moving from `intro` to `transition`.
pub const TRANSITION_MESSAGE: &str = "Thanks for sharing that background. Before we dig into \
technical topics, tell me briefly which recent project you are most proud of and why.";

/// Spoken when moving from `transition` to `technical`.
pub const TECHNICAL_MESSAGE: &str = "Great, let's move on to the technical part of the \
interview. I'll ask you a few questions about concepts and design decisions relevant to this role.";

/// Spoken when moving from `technical` to `coding`.
pub const CODING_MESSAGE: &str = "Nice work. Now we'll switch to a live coding round. \
I'll open a problem in the editor; solve it or skip it when you're ready.";

/// Spoken when the coding round is complete and the session moves to `final`.
pub const CLOSING_MESSAGE: &str = "That wraps up the coding round and our interview. \
Thank you for your time today. You can end the session to receive your report.";

// ============================================================================
// Stage
// ============================================================================

/// Stage of a mock interview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Greeting and background questions.
    #[default]
    Intro,
    /// Bridge between background and technical questions.
    Transition,
    /// Technical questions.
    Technical,
    /// Live coding round.
    Coding,
    /// Wrap-up after the coding round.
    Final,
    /// Session over; no further turns are accepted.
    Ended,
}

impl Stage {
    /// Returns `true` if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// The stage that automatically follows this one, if any.
    ///
    /// `final` has no automatic successor; only an explicit end leaves it.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Intro => Some(Self::Transition),
            Self::Transition => Some(Self::Technical),
            Self::Technical => Some(Self::Coding),
            Self::Coding => Some(Self::Final),
            Self::Final | Self::Ended => None,
        }
    }

    /// The canned message spoken on entering this stage, if any.
    #[must_use]
    pub const fn entry_message(&self) -> Option<&'static str> {
        match self {
            Self::Transition => Some(TRANSITION_MESSAGE),
            Self::Technical => Some(TECHNICAL_MESSAGE),
            Self::Coding => Some(CODING_MESSAGE),
            Self::Final => Some(CLOSING_MESSAGE),
            Self::Intro | Self::Ended => None,
        }
    }

    /// The tag written into transcript messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Transition => "transition",
            Self::Technical => "technical",
            Self::Coding => "coding",
            Self::Final => "final",
            Self::Ended => "ended",
        }
    }

    /// Number of AI messages tagged with this stage that make the next
    /// submission trigger a transition. `None` for stages that do not
    /// advance on message count.
    const fn message_threshold(self) -> Option<u32> {
        match self {
            Self::Intro => Some(2),
            Self::Transition => Some(1),
            Self::Technical => Some(4),
            Self::Coding | Self::Final | Self::Ended => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// StageCounters
// ============================================================================

/// AI message counts per stage tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounters {
    intro: u32,
    transition: u32,
    technical: u32,
    coding: u32,
    final_stage: u32,
}

impl StageCounters {
    /// Number of AI messages recorded for `stage`.
    #[must_use]
    pub const fn get(&self, stage: Stage) -> u32 {
        match stage {
            Stage::Intro => self.intro,
            Stage::Transition => self.transition,
            Stage::Technical => self.technical,
            Stage::Coding => self.coding,
            Stage::Final => self.final_stage,
            Stage::Ended => 0,
        }
    }

    fn increment(&mut self, stage: Stage) {
        let slot = match stage {
            Stage::Intro => &mut self.intro,
            Stage::Transition => &mut self.transition,
            Stage::Technical => &mut self.technical,
            Stage::Coding => &mut self.coding,
            Stage::Final => &mut self.final_stage,
            Stage::Ended => return,
        };
        *slot = slot.saturating_add(1);
    }
}

// ============================================================================
// StageMachine
// ============================================================================

/// Current stage plus the counters that drive automatic transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMachine {
    stage: Stage,
    counters: StageCounters,
}

impl StageMachine {
    /// Creates a machine in the `intro` stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current stage.
    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// The per-stage AI message counts.
    #[must_use]
    pub const fn counters(&self) -> StageCounters {
        self.counters
    }

    /// Records an AI message tagged with `stage`.
    pub fn record_ai_message(&mut self, stage: Stage) {
        self.counters.increment(stage);
    }

    /// The stage to move to on the next submission, if a count-driven
    /// transition is due.
    ///
    /// `coding -> final` is never returned here; the coding round decides it
    /// from recorded attempts.
    #[must_use]
    pub const fn due_transition(&self) -> Option<Stage> {
        match self.stage.message_threshold() {
            Some(threshold) if self.counters.get(self.stage) >= threshold => self.stage.next(),
            _ => None,
        }
    }

    /// Moves to `to`, which must be the immediate successor of the current stage.
    pub fn advance(&mut self, to: Stage) -> Result<()> {
        if self.stage.next() != Some(to) {
            return Err(InterviewError::invalid_transition(self.stage, to));
        }
        self.stage = to;
        Ok(())
    }

    /// Moves to `ended` from any stage. Returns `false` if already ended.
    pub fn end(&mut self) -> bool {
        if self.stage.is_terminal() {
            return false;
        }
        self.stage = Stage::Ended;
        true
    }
}
