//! # Rule-Based Fallback
//!
//! Deterministic classifier used whenever the reasoning engine cannot give a
//! usable answer. It is total: every `ErrorContext`, however sparse, maps to
//! a well-formed [`Diagnosis`].
//!
//! Classification is an ordered rule table over the HTTP status, evaluated
//! top to bottom with the first match winning:
//!
//! | rule                         | type              |
//! |------------------------------|-------------------|
//! | 401, 403                     | `authentication`  |
//! | 408, 429, 500..=599          | `connectivity`    |
//! | 400..=499                    | `payload_mapping` |
//! | anything else (including 0)  | `unknown`         |

use crate::model::{Diagnosis, DiagnosisType, ErrorContext, RetryHint, Signals};

/// Seconds a retryable failure should wait before the next attempt
pub const RETRY_AFTER_SECONDS: u64 = 60;

/// Default retry budget granted to retryable failures
pub const DEFAULT_MAX_ATTEMPTS: u64 = 6;

/// One row of the status classification table
#[derive(Debug, Clone, Copy)]
pub struct StatusRule {
    pub name: &'static str,
    pub matches: fn(i64) -> bool,
    pub kind: DiagnosisType,
}

/// Status rules in evaluation order
pub const STATUS_RULES: &[StatusRule] = &[
    StatusRule {
        name: "credentials_rejected",
        matches: |s| s == 401 || s == 403,
        kind: DiagnosisType::Authentication,
    },
    StatusRule {
        name: "transient_upstream",
        matches: |s| s == 408 || s == 429 || is_server_error(s),
        kind: DiagnosisType::Connectivity,
    },
    StatusRule {
        name: "client_payload",
        matches: is_client_error,
        kind: DiagnosisType::PayloadMapping,
    },
];

const RETRY_FIXES: [&str; 2] = [
    "Retry with exponential backoff",
    "Check downstream health & credentials",
];

const MANUAL_FIXES: [&str; 2] = [
    "Review payload/mapping",
    "Correct master data and reprocess",
];

fn is_client_error(status: i64) -> bool {
    (400..500).contains(&status)
}

fn is_server_error(status: i64) -> bool {
    (500..600).contains(&status)
}

/// Maps a status code to a diagnosis type using [`STATUS_RULES`]
pub fn classify_status(status: i64) -> DiagnosisType {
    STATUS_RULES
        .iter()
        .find(|rule| (rule.matches)(status))
        .map(|rule| rule.kind)
        .unwrap_or(DiagnosisType::Unknown)
}

/// Rule engine producing diagnoses without any external call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackClassifier {
    default_max_attempts: u64,
}

impl Default for FallbackClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl FallbackClassifier {
    pub fn new(default_max_attempts: u64) -> Self {
        Self {
            default_max_attempts,
        }
    }

    pub fn default_max_attempts(&self) -> u64 {
        self.default_max_attempts
    }

    /// Builds a diagnosis from the context alone.
    ///
    /// `reason` names why the fallback ran (`circuit_open`, `schema_invalid`,
    /// `AI_TIMEOUT`, or an engine error message) and is echoed into the
    /// description and root causes.
    pub fn classify(&self, ctx: &ErrorContext, reason: &str) -> Diagnosis {
        let status = ctx.status_code();
        let kind = classify_status(status);
        let retry = kind == DiagnosisType::Connectivity;

        let retry_hint = if retry {
            RetryHint {
                allowed: true,
                after_seconds: RETRY_AFTER_SECONDS,
                max_attempts: self.default_max_attempts,
            }
        } else {
            RetryHint::denied()
        };

        let root_causes = [
            reason.to_string(),
            format!("http_status={}", status),
            format!("step={}", ctx.step_name),
        ]
        .into_iter()
        .filter(|cause| !cause.is_empty())
        .collect();

        let fixes = if retry { RETRY_FIXES } else { MANUAL_FIXES };

        Diagnosis {
            flow: ctx.flow_or_default().to_string(),
            kind,
            description: format!("Rule-based decision ({}) for status {}", reason, status),
            root_causes,
            suggested_fix: fixes.iter().map(|fix| fix.to_string()).collect(),
            retry_hint,
            requires_manual: !retry && is_client_error(status),
            signals: Signals {
                http_status: if status != 0 {
                    status.to_string()
                } else {
                    String::new()
                },
                target_system: ctx.target_system.clone(),
                step: ctx.step_name.clone(),
            },
        }
    }
}
