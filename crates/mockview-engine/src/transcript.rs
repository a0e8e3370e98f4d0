//! The interview transcript.
//!
//! Messages are appended in chronological order and never removed. A user
//! message can gain feedback exactly once, some time after it was appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::ChatMessage;
use crate::stage::Stage;

/// Who sent a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The AI interviewer.
    Ai,
    /// The candidate.
    User,
}

/// Coaching feedback on a candidate answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// What to improve.
    pub suggestion: String,
    /// A stronger example answer.
    pub example: String,
}

/// One transcript message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent it.
    pub sender: Sender,
    /// What was said.
    pub text: String,
    /// Stage the message belongs to.
    pub stage: Stage,
    /// Feedback, for user messages that received it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(sender: Sender, text: impl Into<String>, stage: Stage) -> Self {
        Self {
            sender,
            text: text.into(),
            stage,
            feedback: None,
            timestamp: Utc::now(),
        }
    }

    /// Converts to a backend chat message, tagging the content with its stage.
    #[must_use]
    pub fn to_chat_message(&self) -> ChatMessage {
        let role = match self.sender {
            Sender::Ai => "assistant",
            Sender::User => "user",
        };
        ChatMessage {
            role: role.to_string(),
            content: format!("[{}] {}", self.stage, self.text),
        }
    }
}

/// Append-only list of messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message and returns its index.
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    /// Attaches feedback to the user message at `index`.
    ///
    /// Returns `false` if there is no such user message or it already has
    /// feedback.
    pub fn attach_feedback(&mut self, index: usize, feedback: Feedback) -> bool {
        match self.messages.get_mut(index) {
            Some(message) if message.sender == Sender::User && message.feedback.is_none() => {
                message.feedback = Some(feedback);
                true
            }
            _ => false,
        }
    }

    /// All messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent AI message before `index`, if any.
    #[must_use]
    pub fn last_ai_before(&self, index: usize) -> Option<&Message> {
        self.messages
            .get(..index)?
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Ai)
    }

    /// The whole transcript as backend chat messages.
    #[must_use]
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(Message::to_chat_message).collect()
    }

    /// Converts the transcript to report entries.
    #[must_use]
    pub fn to_report_entries(&self) -> Vec<mockview_report::TranscriptEntry> {
        self.messages
            .iter()
            .map(|m| {
                let speaker = match m.sender {
                    Sender::Ai => mockview_report::Speaker::Ai,
                    Sender::User => mockview_report::Speaker::User,
                };
                let entry = mockview_report::TranscriptEntry::new(m.stage.as_str(), speaker, &m.text);
                match &m.feedback {
                    Some(fb) => entry.with_feedback(&fb.suggestion, &fb.example),
                    None => entry,
                }
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn feedback() -> Feedback {
        Feedback {
            suggestion: "Be specific".to_string(),
            example: "I led a team of four".to_string(),
        }
    }

    #[test]
    fn test_push_returns_index() {
        let mut transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.push(Message::new(Sender::Ai, "Hi", Stage::Intro)), 0);
        assert_eq!(transcript.push(Message::new(Sender::User, "Hello", Stage::Intro)), 1);
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_feedback_attaches_exactly_once() {
        let mut transcript = Transcript::new();
        let idx = transcript.push(Message::new(Sender::User, "answer", Stage::Intro));

        assert!(transcript.attach_feedback(idx, feedback()));
        assert!(!transcript.attach_feedback(idx, feedback()));
        assert_eq!(transcript.messages()[idx].feedback, Some(feedback()));
    }

    #[test]
    fn test_feedback_rejected_on_ai_message_or_bad_index() {
        let mut transcript = Transcript::new();
        let idx = transcript.push(Message::new(Sender::Ai, "question", Stage::Intro));

        assert!(!transcript.attach_feedback(idx, feedback()));
        assert!(!transcript.attach_feedback(42, feedback()));
    }

    #[test]
    fn test_chat_messages_are_stage_tagged() {
        let mut transcript = Transcript::new();
        transcript.push(Message::new(Sender::Ai, "Tell me about yourself", Stage::Intro));
        transcript.push(Message::new(Sender::User, "I build APIs", Stage::Intro));

        let chat = transcript.to_chat_messages();
        assert_eq!(chat[0].role, "assistant");
        assert_eq!(chat[0].content, "[intro] Tell me about yourself");
        assert_eq!(chat[1].role, "user");
    }

    #[test]
    fn test_last_ai_before() {
        let mut transcript = Transcript::new();
        transcript.push(Message::new(Sender::Ai, "Q1", Stage::Intro));
        transcript.push(Message::new(Sender::User, "A1", Stage::Intro));
        let idx = transcript.push(Message::new(Sender::User, "A1 cont", Stage::Intro));

        assert_eq!(transcript.last_ai_before(idx).unwrap().text, "Q1");
        assert!(transcript.last_ai_before(0).is_none());
    }

    #[test]
    fn test_report_entries_carry_feedback() {
        let mut transcript = Transcript::new();
        transcript.push(Message::new(Sender::Ai, "Q", Stage::Technical));
        let idx = transcript.push(Message::new(Sender::User, "A", Stage::Technical));
        transcript.attach_feedback(idx, feedback());

        let entries = transcript.to_report_entries();
        assert_eq!(entries[0].stage, "technical");
        assert_eq!(entries[0].speaker, mockview_report::Speaker::Ai);
        assert!(entries[1].feedback.is_some());
    }
}
