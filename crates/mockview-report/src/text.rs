//! Plain-text report rendering and transcript parsing.
//!
//! The transcript section holds exactly one line per message plus one
//! indented `Feedback:` line for every message that carries feedback.
//! Free text is escaped (`\\`, `\n`, `\r`, `\|`) so every message stays on a
//! single line and [`parse_transcript`] can rebuild the entries exactly.

use std::fmt::Write;

use chrono::SecondsFormat;

use crate::{FeedbackNote, ProblemOutcome, ReportError, ReportInput, Result, Speaker, TranscriptEntry};

/// Header of the transcript section.
const TRANSCRIPT_HEADER: &str = "== Transcript ==";

/// Header of the coding round section.
const CODING_HEADER: &str = "== Coding Round ==";

/// Prefix of a feedback line.
const FEEDBACK_PREFIX: &str = "    Feedback: ";

/// Separator between suggestion and example on a feedback line.
const EXAMPLE_SEPARATOR: &str = " Example: ";

/// Indentation used for submitted code.
const CODE_INDENT: &str = "    ";

/// Renders a [`ReportInput`] to the uploaded report text.
pub struct TextReportGenerator<'a> {
    input: &'a ReportInput,
}

impl<'a> TextReportGenerator<'a> {
    /// Creates a generator for the given input.
    #[must_use]
    pub const fn new(input: &'a ReportInput) -> Self {
        Self { input }
    }

    /// Generates the complete report text.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_header(&mut output);
        self.write_transcript(&mut output);
        self.write_coding_round(&mut output);

        output
    }

    fn write_header(&self, output: &mut String) {
        let _ = writeln!(output, "Mock Interview Report");
        let _ = writeln!(output, "Session: {}", self.input.session_id);
        let _ = writeln!(output, "Role: {}", escape_field(&self.input.role));
        let _ = writeln!(
            output,
            "Company Type: {}",
            escape_field(&self.input.company_type)
        );
        let _ = writeln!(
            output,
            "Generated: {}",
            self.input
                .generated_at
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(output);
    }

    fn write_transcript(&self, output: &mut String) {
        let _ = writeln!(output, "{TRANSCRIPT_HEADER}");

        for entry in &self.input.transcript {
            let _ = writeln!(
                output,
                "[{}] {}: {}",
                entry.stage,
                entry.speaker,
                escape_field(&entry.text)
            );
            if let Some(feedback) = &entry.feedback {
                let _ = writeln!(
                    output,
                    "{FEEDBACK_PREFIX}{} |{EXAMPLE_SEPARATOR}{}",
                    escape_field(&feedback.suggestion),
                    escape_field(&feedback.example)
                );
            }
        }

        let _ = writeln!(output);
    }

    fn write_coding_round(&self, output: &mut String) {
        let _ = writeln!(output, "{CODING_HEADER}");

        if self.input.problems.is_empty() {
            let _ = writeln!(output, "No coding problems attempted.");
            return;
        }

        for (index, problem) in self.input.problems.iter().enumerate() {
            write_problem(output, index + 1, problem);
        }
    }
}

fn write_problem(output: &mut String, number: usize, problem: &ProblemOutcome) {
    if problem.skipped {
        let _ = writeln!(output, "Problem {number}: {} (skipped)", problem.title);
        return;
    }

    let _ = writeln!(
        output,
        "Problem {number}: {} (solved, {}/{} tests passed)",
        problem.title, problem.passed_tests, problem.total_tests
    );
    if let Some(code) = &problem.code {
        for line in code.lines() {
            let _ = writeln!(output, "{CODE_INDENT}{line}");
        }
    }
}

/// Parses the transcript section of a report produced by [`TextReportGenerator`].
///
/// # Errors
///
/// Returns [`ReportError::InvalidData`] if the transcript section is missing,
/// and [`ReportError::Parse`] for malformed message or feedback lines.
pub fn parse_transcript(report: &str) -> Result<Vec<TranscriptEntry>> {
    let mut lines = report.lines().enumerate();

    if !lines.any(|(_, line)| line == TRANSCRIPT_HEADER) {
        return Err(ReportError::InvalidData(
            "report has no transcript section".to_string(),
        ));
    }

    let mut entries: Vec<TranscriptEntry> = Vec::new();

    for (index, line) in lines {
        let line_no = index + 1;
        if line.is_empty() || line.starts_with("== ") {
            break;
        }

        if let Some(rest) = line.strip_prefix(FEEDBACK_PREFIX) {
            let feedback = parse_feedback(rest, line_no)?;
            let entry = entries
                .last_mut()
                .ok_or_else(|| ReportError::parse(line_no, "feedback before any message"))?;
            if entry.feedback.is_some() {
                return Err(ReportError::parse(line_no, "message already has feedback"));
            }
            entry.feedback = Some(feedback);
            continue;
        }

        entries.push(parse_message(line, line_no)?);
    }

    Ok(entries)
}

fn parse_message(line: &str, line_no: usize) -> Result<TranscriptEntry> {
    let rest = line
        .strip_prefix('[')
        .ok_or_else(|| ReportError::parse(line_no, "expected '[stage]'"))?;
    let (stage, rest) = rest
        .split_once("] ")
        .ok_or_else(|| ReportError::parse(line_no, "unterminated stage tag"))?;
    let (label, text) = rest
        .split_once(": ")
        .ok_or_else(|| ReportError::parse(line_no, "expected 'Speaker: text'"))?;
    let speaker = Speaker::from_label(label)
        .ok_or_else(|| ReportError::parse(line_no, format!("unknown speaker '{label}'")))?;

    Ok(TranscriptEntry {
        stage: stage.to_string(),
        speaker,
        text: unescape_field(text),
        feedback: None,
    })
}

fn parse_feedback(rest: &str, line_no: usize) -> Result<FeedbackNote> {
    let split = find_unescaped_pipe(rest)
        .ok_or_else(|| ReportError::parse(line_no, "feedback line has no example"))?;
    let suggestion = rest[..split]
        .strip_suffix(' ')
        .ok_or_else(|| ReportError::parse(line_no, "malformed feedback separator"))?;
    let example = rest[split + 1..]
        .strip_prefix(EXAMPLE_SEPARATOR)
        .ok_or_else(|| ReportError::parse(line_no, "malformed feedback separator"))?;

    Ok(FeedbackNote {
        suggestion: unescape_field(suggestion),
        example: unescape_field(example),
    })
}

/// Byte offset of the first `|` that is not preceded by an escape.
fn find_unescaped_pipe(text: &str) -> Option<usize> {
    let mut escaped = false;
    for (offset, ch) in text.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '|' => return Some(offset),
            _ => {}
        }
    }
    None
}

fn escape_field(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '|' => escaped.push_str("\\|"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn unescape_field(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            unescaped.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}
