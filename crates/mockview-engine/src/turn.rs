//! Prompts and reply post-processing for interviewer turns.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backend::{ChatMessage, CompletionRequest};
use crate::stage::Stage;
use crate::transcript::Feedback;

/// Suggestion used when the feedback reply cannot be parsed.
pub const FALLBACK_SUGGESTION: &str =
    "Structure your answer around one concrete example and state the outcome you achieved.";

/// Example used when the feedback reply cannot be parsed.
pub const FALLBACK_EXAMPLE: &str = "In my last role I noticed our deploys were slow, so I \
rewrote the pipeline in two weeks and cut release time from an hour to ten minutes.";

static FEEDBACK_FORMAT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?is)SUGGESTION:\s*(.*?)\s*EXAMPLE:\s*(.*)").ok());

/// System instruction for an interviewer turn in `stage`.
#[must_use]
pub fn stage_instruction(stage: Stage, role: &str, company_type: &str) -> String {
    let persona = format!(
        "You are a professional interviewer at a {company_type} company interviewing a \
         candidate for a {role} position. Messages are tagged with the interview stage they \
         belong to."
    );

    let focus = match stage {
        Stage::Intro => {
            "We are in the introduction. Ask about the candidate's background, experience and \
             motivation. Do not ask technical or coding questions."
        }
        Stage::Transition => {
            "We are moving from background to technical topics. Ask about a past project that \
             bridges the two. Do not ask coding questions."
        }
        Stage::Technical => {
            "We are in the technical stage. Ask one conceptual or design question relevant to \
             the role. Do not ask the candidate to write code."
        }
        Stage::Coding => {
            "The candidate is working on a live coding problem. Do not ask any questions. \
             Respond with a brief acknowledgement or hint about their approach without giving \
             away the solution."
        }
        Stage::Final | Stage::Ended => {
            "The interview is wrapping up. Answer any question the candidate has about the \
             role or company, then thank them. Do not ask technical or coding questions."
        }
    };

    let shape = if stage == Stage::Coding {
        "Reply in at most 25 words."
    } else {
        "Briefly acknowledge the previous answer, then ask exactly one question. Reply in 20 to \
         25 words."
    };

    format!("{persona}\n\n{focus}\n\n{shape}")
}

/// Single-shot request for the opening greeting.
#[must_use]
pub fn greeting_request(role: &str, company_type: &str) -> CompletionRequest {
    CompletionRequest {
        system: format!(
            "You are a friendly, professional interviewer at a {company_type} company. \
             The candidate is interviewing for a {role} position."
        ),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: format!(
                "Greet the candidate warmly, introduce yourself as their interviewer for the \
                 {role} role, and ask them to tell you about themselves. Keep it under 40 words."
            ),
        }],
    }
}

/// Single-shot request for feedback on `answer`.
#[must_use]
pub fn feedback_request(question: Option<&str>, answer: &str, role: &str) -> CompletionRequest {
    let question = question.unwrap_or("(no question was asked)");
    CompletionRequest {
        system: format!(
            "You are an interview coach reviewing a candidate's answer for a {role} position. \
             Reply in exactly this format and nothing else:\n\
             SUGGESTION: <one sentence on how to improve>\n\
             EXAMPLE: <a short stronger answer>"
        ),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: format!("Question: {question}\nAnswer: {answer}"),
        }],
    }
}

/// Extracts `SUGGESTION:`/`EXAMPLE:` sections, falling back to generic
/// advice when either is missing.
#[must_use]
pub fn parse_feedback(text: &str) -> Feedback {
    let parsed = FEEDBACK_FORMAT.as_ref().and_then(|re| {
        let caps = re.captures(text)?;
        let suggestion = caps.get(1)?.as_str().trim();
        let example = caps.get(2)?.as_str().trim();
        if suggestion.is_empty() || example.is_empty() {
            return None;
        }
        Some(Feedback {
            suggestion: suggestion.to_string(),
            example: example.to_string(),
        })
    });

    parsed.unwrap_or_else(|| Feedback {
        suggestion: FALLBACK_SUGGESTION.to_string(),
        example: FALLBACK_EXAMPLE.to_string(),
    })
}

/// Keeps the first `limit` whitespace-separated words.
#[must_use]
pub fn truncate_words(text: &str, limit: usize) -> String {
    text.split_whitespace()
        .take(limit)
        .collect::<Vec<_>>()
        .join(" ")
}
