//! # Error Triage Core
//!
//! Resilience core of the integration error-triage service. Given the facts
//! of one failed integration step it always returns a structured
//! [`Diagnosis`], preferring the reasoning engine's answer and degrading to
//! a deterministic rule-based classification whenever the engine is
//! unavailable, slow, or produces something outside the contract.
//!
//! ## Components
//!
//! - [`CircuitBreaker`]: stops calling a failing engine for a cooldown period
//! - [`FallbackClassifier`]: ordered HTTP-status rules, never fails
//! - [`ResponseValidator`]: closed-schema check plus retry-hint repair
//! - [`AnalysisOrchestrator`]: the single `analyze` entry point
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use triage_core_rs::{AnalysisOrchestrator, ErrorContext, OpenAiResponsesEngine, TriageConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TriageConfig::from_env();
//! config.validate()?;
//! triage_core_rs::init_logging(Some(config.logging.clone()))?;
//!
//! let engine = Arc::new(OpenAiResponsesEngine::new(config.engine.clone())?);
//! let orchestrator = AnalysisOrchestrator::from_config(&config, engine);
//!
//! let ctx = ErrorContext::new("OrderToCash")
//!     .step("Call S/4 API")
//!     .http_status("503")
//!     .error_message("Service Unavailable");
//! let diagnosis = orchestrator.analyze(&ctx).await;
//! println!("{}", serde_json::to_string_pretty(&diagnosis)?);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod schema;
pub mod validation;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, Clock, ManualClock, SystemClock};
pub use config::{EngineConfig, TriageConfig};
pub use deadline::{run_with_deadline, DeadlineElapsed, Timed};
pub use engine::{OpenAiResponsesEngine, ReasoningEngine};
pub use error::{EngineError, Result, SchemaViolation, TriageError};
pub use fallback::FallbackClassifier;
pub use logging::{init_logging, LoggingConfig};
pub use model::{Diagnosis, DiagnosisType, ErrorContext, RetryHint, Signals};
pub use orchestrator::{Analysis, AnalysisOrchestrator, DiagnosisSource};
pub use prompt::{PromptRenderer, TemplateRenderer};
pub use validation::ResponseValidator;
