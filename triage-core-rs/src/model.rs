//! # Triage Data Model
//!
//! `ErrorContext` is the request-side description of one failed integration
//! step. `Diagnosis` is the closed output contract every analysis path must
//! produce, whether it came from the reasoning engine or the rule engine.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Flow name used when the caller did not supply one
pub const UNKNOWN_FLOW: &str = "UnknownFlow";

/// Facts about a failed integration step, as posted by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default = "default_flow", deserialize_with = "deserialize_flow")]
    pub flow: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub step_name: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub target_system: String,
    /// Raw status as received; may be numeric text, a number, or junk
    #[serde(default, deserialize_with = "deserialize_status")]
    pub http_status: String,
    #[serde(default = "generation_timestamp", deserialize_with = "deserialize_timestamp")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "deserialize_text")]
    pub error_message: String,
    #[serde(default, deserialize_with = "deserialize_attempts")]
    pub attempts: u32,
}

impl ErrorContext {
    /// Creates a context for the given flow, stamped with the current time
    pub fn new<S: Into<String>>(flow: S) -> Self {
        Self {
            flow: flow.into(),
            step_name: String::new(),
            target_system: String::new(),
            http_status: String::new(),
            timestamp: generation_timestamp(),
            error_message: String::new(),
            attempts: 0,
        }
    }

    pub fn step<S: Into<String>>(mut self, step_name: S) -> Self {
        self.step_name = step_name.into();
        self
    }

    pub fn target_system<S: Into<String>>(mut self, target_system: S) -> Self {
        self.target_system = target_system.into();
        self
    }

    /// Sets the HTTP status from anything printable (`503`, `"503"`)
    pub fn http_status<S: ToString>(mut self, status: S) -> Self {
        self.http_status = status.to_string();
        self
    }

    pub fn error_message<S: Into<String>>(mut self, message: S) -> Self {
        self.error_message = message.into();
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn timestamp<S: Into<String>>(mut self, timestamp: S) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Integer view of `http_status`; 0 when absent or unparseable
    pub fn status_code(&self) -> i64 {
        parse_status(&self.http_status)
    }

    /// Flow name with the `UnknownFlow` default applied
    pub fn flow_or_default(&self) -> &str {
        if self.flow.is_empty() {
            UNKNOWN_FLOW
        } else {
            &self.flow
        }
    }
}

/// Leading-integer parse: optional whitespace and sign, then digits.
///
/// `"503"` → 503, `" 429 Too Many"` → 429, `"4.5"` → 4, `"abc"` → 0.
/// Values that do not fit in an `i64` are treated as unparseable.
pub fn parse_status(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    match rest[..digits_end].parse::<i64>() {
        Ok(value) if negative => -value,
        Ok(value) => value,
        Err(_) => 0,
    }
}

fn default_flow() -> String {
    UNKNOWN_FLOW.to_string()
}

fn generation_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Scalars are rendered as text; null and structured values yield `None`
fn scalar_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(|value| scalar_text(value).unwrap_or_default())
}

fn deserialize_flow<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer)
        .map(|value| scalar_text(value).unwrap_or_else(default_flow))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(|value| {
        scalar_text(value)
            .filter(|ts| !ts.is_empty())
            .unwrap_or_else(generation_timestamp)
    })
}

fn deserialize_status<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

// Numbers, numeric text ("2", "3 retries") and junk all land in 0..=u32::MAX
fn deserialize_attempts<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let attempts = match value {
        // `as` truncates and saturates floats
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        serde_json::Value::String(s) => parse_status(&s),
        _ => 0,
    };
    Ok(u32::try_from(attempts.max(0)).unwrap_or(u32::MAX))
}

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosisType {
    Authentication,
    Authorization,
    Connectivity,
    Business,
    PayloadMapping,
    Duplicate,
    Configuration,
    Unknown,
}

impl DiagnosisType {
    pub const ALL: [DiagnosisType; 8] = [
        DiagnosisType::Authentication,
        DiagnosisType::Authorization,
        DiagnosisType::Connectivity,
        DiagnosisType::Business,
        DiagnosisType::PayloadMapping,
        DiagnosisType::Duplicate,
        DiagnosisType::Configuration,
        DiagnosisType::Unknown,
    ];

    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosisType::Authentication => "authentication",
            DiagnosisType::Authorization => "authorization",
            DiagnosisType::Connectivity => "connectivity",
            DiagnosisType::Business => "business",
            DiagnosisType::PayloadMapping => "payload_mapping",
            DiagnosisType::Duplicate => "duplicate",
            DiagnosisType::Configuration => "configuration",
            DiagnosisType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DiagnosisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match on the wire name
impl FromStr for DiagnosisType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiagnosisType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

/// Advice to the caller on re-running the failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryHint {
    pub allowed: bool,
    pub after_seconds: u64,
    pub max_attempts: u64,
}

impl RetryHint {
    /// Hint that forbids retrying
    pub fn denied() -> Self {
        Self {
            allowed: false,
            after_seconds: 0,
            max_attempts: 0,
        }
    }

    /// Repairs a hint that allows retries but grants no attempts.
    ///
    /// An allowed retry always carries a positive budget afterwards.
    pub fn normalized(self, default_max_attempts: u64) -> Self {
        if self.allowed && self.max_attempts == 0 {
            Self {
                max_attempts: default_max_attempts,
                ..self
            }
        } else {
            self
        }
    }
}

/// Raw facts echoed back to the caller; every key always present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signals {
    pub http_status: String,
    pub target_system: String,
    pub step: String,
}

/// Normalized triage result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Diagnosis {
    pub flow: String,
    #[serde(rename = "type")]
    pub kind: DiagnosisType,
    pub description: String,
    pub root_causes: Vec<String>,
    pub suggested_fix: Vec<String>,
    pub retry_hint: RetryHint,
    pub requires_manual: bool,
    pub signals: Signals,
}
