//! Configuration types for the MockView interview engine.
//!
//! This module provides the configuration structures that control backend
//! endpoints, timing of the speech and monitoring loops, the coding round,
//! and affect detection.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coding::Language;
use crate::error::{InterviewError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "mockview.json";

/// Default base URL for every backend endpoint.
const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";

fn endpoint(path: &str) -> String {
    format!("{DEFAULT_BASE_URL}/{path}")
}

/// Default cadence of the viseme ticker in milliseconds.
const fn default_viseme_cadence_ms() -> u64 {
    150
}

/// Default silence grace period before auto-submitting a capture.
const fn default_capture_grace_ms() -> u64 {
    3000
}

/// Default interval between affect samples.
const fn default_affect_interval_ms() -> u64 {
    4000
}

/// Default pause between finishing one coding problem and the next step.
const fn default_coding_advance_delay_ms() -> u64 {
    1500
}

/// Default per-request timeout for backend calls.
const fn default_request_timeout_secs() -> u64 {
    30
}

/// Default number of coding attempts per round.
const fn default_max_attempts() -> u32 {
    3
}

/// Default maximum number of words in an interviewer reply.
const fn default_reply_word_limit() -> usize {
    25
}

/// Default score at or above which a nervous sample is stored.
const fn default_nervous_threshold() -> f64 {
    0.5
}

fn default_language() -> String {
    "javascript".to_string()
}

fn default_preferred_voices() -> Vec<String> {
    vec![
        "Google US English".to_string(),
        "Samantha".to_string(),
        "Microsoft Aria".to_string(),
        "Microsoft Zira".to_string(),
    ]
}

/// Main configuration for a MockView session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend endpoint URLs.
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Timers and cadences.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Coding round settings.
    #[serde(default)]
    pub coding: CodingConfig,

    /// Affect monitor settings.
    #[serde(default)]
    pub affect: AffectConfig,

    /// Hard cap on the number of words in an interviewer reply.
    #[serde(default = "default_reply_word_limit")]
    pub reply_word_limit: usize,

    /// Voice names to prefer for speech synthesis, in priority order.
    #[serde(default = "default_preferred_voices")]
    pub preferred_voices: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            timing: TimingConfig::default(),
            coding: CodingConfig::default(),
            affect: AffectConfig::default(),
            reply_word_limit: default_reply_word_limit(),
            preferred_voices: default_preferred_voices(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `mockview.json`; falls back to defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            InterviewError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `mockview.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::ConfigParseError` if the file exists but
    /// contains invalid JSON, and `InterviewError::ConfigValidationError` if
    /// the values are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(InterviewError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| InterviewError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `InterviewError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.coding.max_attempts == 0 {
            return Err(InterviewError::config_validation(
                "coding.maxAttempts must be greater than 0",
                "Set coding.maxAttempts to at least 1 in your mockview.json",
            ));
        }

        if self.reply_word_limit == 0 {
            return Err(InterviewError::config_validation(
                "replyWordLimit must be greater than 0",
                "Set replyWordLimit to at least 1 in your mockview.json",
            ));
        }

        if self.timing.viseme_cadence_ms == 0 {
            return Err(InterviewError::config_validation(
                "timing.visemeCadenceMs must be greater than 0",
                "Set timing.visemeCadenceMs to a positive number of milliseconds",
            ));
        }

        if self.timing.affect_interval_ms == 0 {
            return Err(InterviewError::config_validation(
                "timing.affectIntervalMs must be greater than 0",
                "Set timing.affectIntervalMs to a positive number of milliseconds",
            ));
        }

        if self.timing.request_timeout_secs == 0 {
            return Err(InterviewError::config_validation(
                "timing.requestTimeoutSecs must be greater than 0",
                "Set timing.requestTimeoutSecs to at least 1 second",
            ));
        }

        if !(0.0..=1.0).contains(&self.affect.nervous_threshold) {
            return Err(InterviewError::config_validation(
                "affect.nervousThreshold must be between 0 and 1",
                "Set affect.nervousThreshold to a score such as 0.5",
            ));
        }

        if Language::from_name(&self.coding.default_language).is_none() {
            return Err(InterviewError::config_validation(
                format!(
                    "coding.defaultLanguage '{}' is not supported",
                    self.coding.default_language
                ),
                "Use 'javascript' or 'python' in your mockview.json",
            ));
        }

        self.endpoints.validate()
    }
}

/// URLs of the external backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// AI text generation (also used for feedback).
    #[serde(default = "EndpointConfig::default_text")]
    pub text_generation: String,
    /// Coding problem generation.
    #[serde(default = "EndpointConfig::default_problem")]
    pub problem_generation: String,
    /// Remote code execution.
    #[serde(default = "EndpointConfig::default_execution")]
    pub code_execution: String,
    /// Nervousness detection.
    #[serde(default = "EndpointConfig::default_affect")]
    pub affect_detection: String,
    /// Storage of flagged affect samples.
    #[serde(default = "EndpointConfig::default_affect_storage")]
    pub affect_storage: String,
    /// Report upload.
    #[serde(default = "EndpointConfig::default_report_upload")]
    pub report_upload: String,
    /// Session record base URL; the session id is appended.
    #[serde(default = "EndpointConfig::default_session_record")]
    pub session_record: String,
}

impl EndpointConfig {
    fn default_text() -> String {
        endpoint("generate")
    }

    fn default_problem() -> String {
        endpoint("coding/problem")
    }

    fn default_execution() -> String {
        endpoint("coding/execute")
    }

    fn default_affect() -> String {
        endpoint("affect/detect")
    }

    fn default_affect_storage() -> String {
        endpoint("affect/samples")
    }

    fn default_report_upload() -> String {
        endpoint("reports")
    }

    fn default_session_record() -> String {
        endpoint("sessions")
    }

    fn validate(&self) -> Result<()> {
        let all = [
            ("endpoints.textGeneration", &self.text_generation),
            ("endpoints.problemGeneration", &self.problem_generation),
            ("endpoints.codeExecution", &self.code_execution),
            ("endpoints.affectDetection", &self.affect_detection),
            ("endpoints.affectStorage", &self.affect_storage),
            ("endpoints.reportUpload", &self.report_upload),
            ("endpoints.sessionRecord", &self.session_record),
        ];
        for (name, url) in all {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(InterviewError::config_validation(
                    format!("{name} must be an http(s) URL, got '{url}'"),
                    format!("Set {name} to a full URL such as {DEFAULT_BASE_URL}/..."),
                ));
            }
        }
        Ok(())
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            text_generation: Self::default_text(),
            problem_generation: Self::default_problem(),
            code_execution: Self::default_execution(),
            affect_detection: Self::default_affect(),
            affect_storage: Self::default_affect_storage(),
            report_upload: Self::default_report_upload(),
            session_record: Self::default_session_record(),
        }
    }
}

/// Timers and cadences, all in milliseconds unless noted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingConfig {
    /// How often the viseme ticker advances one character.
    #[serde(default = "default_viseme_cadence_ms")]
    pub viseme_cadence_ms: u64,
    /// Silence grace period before a finished capture is auto-submitted.
    #[serde(default = "default_capture_grace_ms")]
    pub capture_grace_ms: u64,
    /// Interval between affect samples.
    #[serde(default = "default_affect_interval_ms")]
    pub affect_interval_ms: u64,
    /// Pause after a solved or skipped problem before advancing.
    #[serde(default = "default_coding_advance_delay_ms")]
    pub coding_advance_delay_ms: u64,
    /// Timeout for each backend request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl TimingConfig {
    /// Viseme cadence as a [`Duration`].
    #[must_use]
    pub const fn viseme_cadence(&self) -> Duration {
        Duration::from_millis(self.viseme_cadence_ms)
    }

    /// Capture grace period as a [`Duration`].
    #[must_use]
    pub const fn capture_grace(&self) -> Duration {
        Duration::from_millis(self.capture_grace_ms)
    }

    /// Affect interval as a [`Duration`].
    #[must_use]
    pub const fn affect_interval(&self) -> Duration {
        Duration::from_millis(self.affect_interval_ms)
    }

    /// Coding advance delay as a [`Duration`].
    #[must_use]
    pub const fn coding_advance_delay(&self) -> Duration {
        Duration::from_millis(self.coding_advance_delay_ms)
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            viseme_cadence_ms: default_viseme_cadence_ms(),
            capture_grace_ms: default_capture_grace_ms(),
            affect_interval_ms: default_affect_interval_ms(),
            coding_advance_delay_ms: default_coding_advance_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Coding round settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodingConfig {
    /// Solved-or-skipped attempts that complete the round.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Language assumed when a submission does not name one.
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for CodingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            default_language: default_language(),
        }
    }
}

/// Affect monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectConfig {
    /// Minimum score for a nervous sample to be stored.
    #[serde(default = "default_nervous_threshold")]
    pub nervous_threshold: f64,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            nervous_threshold: default_nervous_threshold(),
        }
    }
}
