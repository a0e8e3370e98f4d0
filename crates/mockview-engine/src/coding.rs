//! The live coding round.
//!
//! Problems come from a generation backend whose payload may be a structured
//! object or free text with JSON embedded in it. Submissions run every test
//! case against a remote execution backend; a problem counts as solved only
//! when every case passes.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{ExecutionBackend, ExecutionRequest};

/// Title given to problems whose payload could not be parsed.
pub const FALLBACK_TITLE: &str = "Coding Challenge";

/// Function name assumed when a problem does not name one.
const DEFAULT_FUNCTION_NAME: &str = "solution";

// ============================================================================
// Problem
// ============================================================================

/// One input/expected-output pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Argument list as source text, e.g. `[2,7,11,15],9`.
    #[serde(deserialize_with = "string_or_json")]
    pub input: String,
    /// Expected printed output, e.g. `[0,1]`.
    #[serde(deserialize_with = "string_or_json", alias = "output")]
    pub expected: String,
}

/// A coding problem. Replaced, never mutated, when the next one is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodingProblem {
    /// Short title.
    pub title: String,
    /// Full statement.
    pub description: String,
    /// Worked example.
    #[serde(default)]
    pub example: String,
    /// Function the candidate must implement.
    #[serde(default = "default_function_name", alias = "function_name")]
    pub function_name: String,
    /// Test cases.
    #[serde(default, alias = "test_cases")]
    pub test_cases: Vec<TestCase>,
    /// Companies known to ask this problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companies: Option<Vec<String>>,
}

fn default_function_name() -> String {
    DEFAULT_FUNCTION_NAME.to_string()
}

/// Accepts either a JSON string or any other JSON value rendered compactly.
fn string_or_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

impl CodingProblem {
    /// The problem built when a payload cannot be parsed.
    #[must_use]
    pub fn fallback(raw: impl Into<String>) -> Self {
        Self {
            title: FALLBACK_TITLE.to_string(),
            description: raw.into(),
            example: String::new(),
            function_name: default_function_name(),
            test_cases: Vec::new(),
            companies: None,
        }
    }
}

static FENCED_JSON: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok());

fn problem_from_value(value: &Value) -> Option<CodingProblem> {
    let object = value.as_object()?;
    if !object.contains_key("title") || !object.contains_key("description") {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

fn problem_from_str(json: &str) -> Option<CodingProblem> {
    serde_json::from_str::<Value>(json.trim())
        .ok()
        .and_then(|v| problem_from_value(&v))
}

fn payload_text(value: &Value) -> Option<&str> {
    if let Some(text) = value.as_str() {
        return Some(text);
    }
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        return Some(text);
    }
    value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
}

/// Extracts a problem from generative text.
///
/// Tries a fenced block first, then the outermost `{...}` span.
#[must_use]
pub fn parse_problem_text(text: &str) -> Option<CodingProblem> {
    if let Some(re) = FENCED_JSON.as_ref() {
        for caps in re.captures_iter(text) {
            if let Some(problem) = caps.get(1).and_then(|m| problem_from_str(m.as_str())) {
                return Some(problem);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    problem_from_str(&text[start..=end])
}

/// Interprets a problem generation payload. Never fails: anything
/// unparseable becomes [`CodingProblem::fallback`].
#[must_use]
pub fn parse_problem_payload(value: &Value) -> CodingProblem {
    if let Some(problem) = problem_from_value(value) {
        return problem;
    }
    if let Some(problem) = value.get("problem").and_then(problem_from_value) {
        return problem;
    }

    match payload_text(value) {
        Some(text) => parse_problem_text(text).unwrap_or_else(|| {
            warn!("problem payload had no parseable JSON, using fallback");
            CodingProblem::fallback(text.trim())
        }),
        None => {
            warn!("problem payload had no text, using fallback");
            CodingProblem::fallback(value.to_string())
        }
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Languages the execution harness can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Node.js.
    #[serde(alias = "js", alias = "node")]
    JavaScript,
    /// Python 3.
    #[serde(alias = "py", alias = "python3")]
    Python,
}

impl Language {
    /// Parses a language name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" | "node" => Some(Self::JavaScript),
            "python" | "py" | "python3" => Some(Self::Python),
            _ => None,
        }
    }

    /// Identifier sent to the execution backend.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appends a call of `function_name` with `input` that prints the result as
/// compact JSON.
#[must_use]
pub fn build_execution_source(
    language: Language,
    code: &str,
    function_name: &str,
    input: &str,
) -> String {
    match language {
        Language::JavaScript => format!(
            "{code}\n\nconsole.log(JSON.stringify({function_name}({input})));\n"
        ),
        Language::Python => format!(
            "{code}\n\nimport json as __json\ntrue, false, null = True, False, None\n\
             print(__json.dumps({function_name}({input}), separators=(',', ':')))\n"
        ),
    }
}

/// Result of one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// 1-based case number.
    pub id: usize,
    /// Case input.
    pub input: String,
    /// Expected output.
    pub expected: String,
    /// What the program printed, or the error.
    pub output: String,
    /// Whether trimmed output equals trimmed expected.
    pub passed: bool,
}

async fn run_case(
    backend: &dyn ExecutionBackend,
    problem: &CodingProblem,
    code: &str,
    language: Language,
    id: usize,
    case: &TestCase,
) -> TestResult {
    let source = build_execution_source(language, code, &problem.function_name, &case.input);
    let request = ExecutionRequest {
        language: language.as_str().to_string(),
        code: source,
    };

    let (output, passed) = match backend.execute(request).await {
        Ok(out) => match out.stdout {
            Some(stdout) if !stdout.trim().is_empty() || out.stderr.is_none() => {
                let output = stdout.trim().to_string();
                let passed = output == case.expected.trim();
                (output, passed)
            }
            _ => (out.stderr.unwrap_or_default().trim().to_string(), false),
        },
        Err(e) => {
            warn!(case = id, error = %e, "execution failed");
            (format!("Execution error: {e}"), false)
        }
    };

    debug!(case = id, passed, "test case finished");
    TestResult {
        id,
        input: case.input.clone(),
        expected: case.expected.clone(),
        output,
        passed,
    }
}

/// Runs every test case concurrently. A failing case never stops the others.
pub async fn run_submission(
    backend: &dyn ExecutionBackend,
    problem: &CodingProblem,
    code: &str,
    language: Language,
) -> Vec<TestResult> {
    join_all(
        problem
            .test_cases
            .iter()
            .enumerate()
            .map(|(i, case)| run_case(backend, problem, code, language, i + 1, case)),
    )
    .await
}

/// `true` when there is at least one result and all passed.
#[must_use]
pub fn all_passed(results: &[TestResult]) -> bool {
    !results.is_empty() && results.iter().all(|r| r.passed)
}

// ============================================================================
// Records
// ============================================================================

/// A solved or skipped problem.
///
/// Skipped records never carry code or results; solved records always do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolvedProblemRecord {
    problem: CodingProblem,
    user_code: Option<String>,
    test_results: Option<Vec<TestResult>>,
    skipped: bool,
    solved_at: DateTime<Utc>,
}

impl SolvedProblemRecord {
    /// Records a solved problem.
    #[must_use]
    pub fn solved(problem: CodingProblem, code: impl Into<String>, results: Vec<TestResult>) -> Self {
        Self {
            problem,
            user_code: Some(code.into()),
            test_results: Some(results),
            skipped: false,
            solved_at: Utc::now(),
        }
    }

    /// Records a skipped problem.
    #[must_use]
    pub fn skipped(problem: CodingProblem) -> Self {
        Self {
            problem,
            user_code: None,
            test_results: None,
            skipped: true,
            solved_at: Utc::now(),
        }
    }

    /// The problem.
    #[must_use]
    pub const fn problem(&self) -> &CodingProblem {
        &self.problem
    }

    /// Submitted code; `None` when skipped.
    #[must_use]
    pub fn user_code(&self) -> Option<&str> {
        self.user_code.as_deref()
    }

    /// Test results; `None` when skipped.
    #[must_use]
    pub fn test_results(&self) -> Option<&[TestResult]> {
        self.test_results.as_deref()
    }

    /// Whether the problem was skipped.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// When the attempt was recorded.
    #[must_use]
    pub const fn solved_at(&self) -> DateTime<Utc> {
        self.solved_at
    }

    /// Converts to the report's representation.
    #[must_use]
    pub fn to_outcome(&self) -> mockview_report::ProblemOutcome {
        let results = self.test_results().unwrap_or_default();
        mockview_report::ProblemOutcome {
            title: self.problem.title.clone(),
            skipped: self.skipped,
            passed_tests: results.iter().filter(|r| r.passed).count(),
            total_tests: results.len(),
            code: self.user_code.clone(),
            solved_at: self.solved_at,
        }
    }
}

// ============================================================================
// Round State
// ============================================================================

/// Attempt count right after recording an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptProgress {
    /// Attempts recorded, including this one.
    pub attempts: u32,
    /// Whether the round is now complete.
    pub round_complete: bool,
}

/// State of the coding round.
#[derive(Debug, Clone)]
pub struct CodingRound {
    max_attempts: u32,
    current: Option<CodingProblem>,
    editor_open: bool,
    records: Vec<SolvedProblemRecord>,
    seen_titles: Vec<String>,
}

impl CodingRound {
    /// Creates an empty round.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            current: None,
            editor_open: false,
            records: Vec::new(),
            seen_titles: Vec::new(),
        }
    }

    /// The open problem.
    #[must_use]
    pub const fn current(&self) -> Option<&CodingProblem> {
        self.current.as_ref()
    }

    /// Whether the editor is open.
    #[must_use]
    pub const fn editor_open(&self) -> bool {
        self.editor_open
    }

    /// Attempts recorded so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        u32::try_from(self.records.len()).unwrap_or(u32::MAX)
    }

    /// Attempts that complete the round.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[SolvedProblemRecord] {
        &self.records
    }

    /// Titles of every problem shown so far.
    #[must_use]
    pub fn seen_titles(&self) -> &[String] {
        &self.seen_titles
    }

    /// Whether the round is complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.attempts() >= self.max_attempts
    }

    /// Replaces the current problem and opens the editor.
    pub fn open_problem(&mut self, problem: CodingProblem) {
        self.seen_titles.push(problem.title.clone());
        self.current = Some(problem);
        self.editor_open = true;
    }

    /// Opens the editor. Returns `false` if there is no problem.
    pub fn open_editor(&mut self) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.editor_open = true;
        true
    }

    /// Closes the editor.
    pub fn close_editor(&mut self) {
        self.editor_open = false;
    }

    /// Records an attempt. If the attempt is on the current problem, clears
    /// it and closes the editor; a newer problem stays open.
    pub fn record(&mut self, record: SolvedProblemRecord) -> AttemptProgress {
        if self.current.as_ref() == Some(record.problem()) {
            self.current = None;
            self.editor_open = false;
        }
        self.records.push(record);
        AttemptProgress {
            attempts: self.attempts(),
            round_complete: self.is_complete(),
        }
    }
}
