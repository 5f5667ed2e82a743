//! # Response Validation
//!
//! Enforces the closed [`Diagnosis`] contract on whatever the reasoning
//! engine produced. The input is an arbitrary decoded JSON value; it may not
//! be an object at all. Checks run in a fixed order and stop at the first
//! violation, which is returned so callers can log exactly what was wrong.
//!
//! Normalization runs only after every check passes and never hides a
//! violation.

use serde_json::{Map, Value};

use crate::error::SchemaViolation;
use crate::fallback::DEFAULT_MAX_ATTEMPTS;
use crate::model::{Diagnosis, DiagnosisType, RetryHint, Signals};

/// Top-level keys of a diagnosis, all required
pub const DIAGNOSIS_KEYS: [&str; 8] = [
    "flow",
    "type",
    "description",
    "root_causes",
    "suggested_fix",
    "retry_hint",
    "requires_manual",
    "signals",
];

const RETRY_HINT_KEYS: [&str; 3] = ["allowed", "after_seconds", "max_attempts"];

const SIGNAL_KEYS: [&str; 3] = ["http_status", "target_system", "step"];

type Checked<T> = Result<T, SchemaViolation>;

/// Validates and normalizes engine output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseValidator {
    default_max_attempts: u64,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl ResponseValidator {
    pub fn new(default_max_attempts: u64) -> Self {
        Self {
            default_max_attempts,
        }
    }

    /// Validates `value` against the diagnosis contract and returns the
    /// normalized diagnosis, or the first violation found.
    pub fn validate(&self, value: &Value) -> Checked<Diagnosis> {
        let object = as_object(value, "")?;
        check_exact_keys(object, &DIAGNOSIS_KEYS, "")?;

        let type_name = non_empty_string(&object["type"], "/type")?;
        let kind = type_name
            .parse::<DiagnosisType>()
            .map_err(|_| SchemaViolation::UnknownType {
                path: "/type".to_string(),
                value: type_name.to_string(),
            })?;
        let flow = non_empty_string(&object["flow"], "/flow")?;
        let description = non_empty_string(&object["description"], "/description")?;

        let root_causes = string_list(&object["root_causes"], "/root_causes")?;
        let suggested_fix = string_list(&object["suggested_fix"], "/suggested_fix")?;

        let retry_hint = retry_hint(&object["retry_hint"])?;
        let signals = signals(&object["signals"])?;

        let requires_manual = object["requires_manual"]
            .as_bool()
            .ok_or_else(|| SchemaViolation::NotABool {
                path: "/requires_manual".to_string(),
            })?;

        Ok(Diagnosis {
            flow: flow.to_string(),
            kind,
            description: description.to_string(),
            root_causes,
            suggested_fix,
            retry_hint: retry_hint.normalized(self.default_max_attempts),
            requires_manual,
            signals,
        })
    }

    /// Convenience wrapper that discards the violation detail
    pub fn is_valid(&self, value: &Value) -> bool {
        self.validate(value).is_ok()
    }
}

fn as_object<'a>(value: &'a Value, path: &str) -> Checked<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| SchemaViolation::NotAnObject {
        path: display_path(path),
    })
}

fn check_exact_keys(object: &Map<String, Value>, expected: &[&str], path: &str) -> Checked<()> {
    if let Some(missing) = expected.iter().find(|key| !object.contains_key(**key)) {
        return Err(SchemaViolation::MissingKey {
            path: format!("{}/{}", path, missing),
        });
    }
    if let Some(extra) = object.keys().find(|key| !expected.contains(&key.as_str())) {
        return Err(SchemaViolation::UnexpectedKey {
            path: format!("{}/{}", path, extra),
        });
    }
    Ok(())
}

fn string<'a>(value: &'a Value, path: &str) -> Checked<&'a str> {
    value.as_str().ok_or_else(|| SchemaViolation::NotAString {
        path: path.to_string(),
    })
}

fn non_empty_string<'a>(value: &'a Value, path: &str) -> Checked<&'a str> {
    let s = string(value, path)?;
    if s.is_empty() {
        return Err(SchemaViolation::Empty {
            path: path.to_string(),
        });
    }
    Ok(s)
}

fn string_list(value: &Value, path: &str) -> Checked<Vec<String>> {
    let items = value.as_array().ok_or_else(|| SchemaViolation::NotAnArray {
        path: path.to_string(),
    })?;
    if items.is_empty() {
        return Err(SchemaViolation::Empty {
            path: path.to_string(),
        });
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| non_empty_string(item, &format!("{}/{}", path, i)).map(str::to_string))
        .collect()
}

/// JSON Schema `integer` with `minimum: 0`; `3.0` is an integer, `3.5` is not
fn non_negative_integer(value: &Value, path: &str) -> Checked<u64> {
    let violation = || SchemaViolation::NotANonNegativeInteger {
        path: path.to_string(),
    };
    if let Some(n) = value.as_u64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(f as u64)
        }
        _ => Err(violation()),
    }
}

fn retry_hint(value: &Value) -> Checked<RetryHint> {
    let object = as_object(value, "/retry_hint")?;
    check_exact_keys(object, &RETRY_HINT_KEYS, "/retry_hint")?;

    let allowed = object["allowed"]
        .as_bool()
        .ok_or_else(|| SchemaViolation::NotABool {
            path: "/retry_hint/allowed".to_string(),
        })?;

    Ok(RetryHint {
        allowed,
        after_seconds: non_negative_integer(&object["after_seconds"], "/retry_hint/after_seconds")?,
        max_attempts: non_negative_integer(&object["max_attempts"], "/retry_hint/max_attempts")?,
    })
}

fn signals(value: &Value) -> Checked<Signals> {
    let object = as_object(value, "/signals")?;
    check_exact_keys(object, &SIGNAL_KEYS, "/signals")?;

    Ok(Signals {
        http_status: string(&object["http_status"], "/signals/http_status")?.to_string(),
        target_system: string(&object["target_system"], "/signals/target_system")?.to_string(),
        step: string(&object["step"], "/signals/step")?.to_string(),
    })
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}
