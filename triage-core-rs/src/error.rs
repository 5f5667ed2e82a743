//! # Error Types
//!
//! Errors raised by the triage core. None of these ever reach the caller of
//! [`AnalysisOrchestrator::analyze`](crate::orchestrator::AnalysisOrchestrator::analyze);
//! engine failures and schema violations are absorbed into fallback
//! diagnoses. `TriageError` only surfaces from configuration loading and
//! logging setup.

use thiserror::Error;

/// A type alias for Result with the error type defaulting to [`TriageError`]
pub type Result<T, E = TriageError> = std::result::Result<T, E>;

/// Crate-level error for setup paths
#[derive(Error, Debug)]
pub enum TriageError {
    /// Configuration could not be loaded or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configuration value was present but unusable
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// The tracing subscriber could not be installed
    #[error("Logging initialization failed: {0}")]
    Logging(String),
}

impl From<config::ConfigError> for TriageError {
    fn from(err: config::ConfigError) -> Self {
        TriageError::Config(err.to_string())
    }
}

/// Failure reported by a reasoning engine.
///
/// The `Display` output is what the orchestrator records as the fallback
/// reason, so messages stay short and free of secrets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// No API key or endpoint available
    #[error("engine not configured: {0}")]
    NotConfigured(String),

    /// 401/403 from the engine endpoint
    #[error("engine authentication failed: {0}")]
    Authentication(String),

    /// 429 from the engine endpoint
    #[error("engine rate limit exceeded: {0}")]
    RateLimited(String),

    /// Other 4xx from the engine endpoint
    #[error("engine rejected request: {0}")]
    InvalidRequest(String),

    /// 5xx from the engine endpoint
    #[error("engine server error: {0}")]
    Server(String),

    /// Connection, DNS or transport-level timeout
    #[error("engine network error: {0}")]
    Network(String),

    /// Response body was not the expected envelope
    #[error("engine response unreadable: {0}")]
    Parse(String),

    /// Anything else the collaborator reports, carried verbatim
    #[error("{0}")]
    Upstream(String),
}

impl EngineError {
    /// Creates an opaque upstream error from a message
    pub fn upstream(message: impl Into<String>) -> Self {
        EngineError::Upstream(message.into())
    }

    /// Returns true for failures that a later attempt might not repeat
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::RateLimited(_) | EngineError::Server(_) | EngineError::Network(_)
        )
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            EngineError::Parse(err.to_string())
        } else {
            EngineError::Network(err.to_string())
        }
    }
}

/// The first contract check a candidate diagnosis failed.
///
/// `path` is a JSON-pointer-like location (`/retry_hint/max_attempts`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("{path}: expected an object")]
    NotAnObject { path: String },

    #[error("{path}: missing required key")]
    MissingKey { path: String },

    #[error("{path}: unexpected key")]
    UnexpectedKey { path: String },

    #[error("{path}: unknown diagnosis type {value:?}")]
    UnknownType { path: String, value: String },

    #[error("{path}: expected a string")]
    NotAString { path: String },

    #[error("{path}: must not be empty")]
    Empty { path: String },

    #[error("{path}: expected an array")]
    NotAnArray { path: String },

    #[error("{path}: expected a boolean")]
    NotABool { path: String },

    #[error("{path}: expected a non-negative integer")]
    NotANonNegativeInteger { path: String },
}
