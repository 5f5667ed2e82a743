//! # Analysis Orchestrator
//!
//! Single entry point of the triage core. Every request ends in a
//! [`Diagnosis`]: the engine's answer when it arrives in time and passes
//! validation, otherwise the rule-based fallback. Breaker bookkeeping is the
//! only shared side effect.
//!
//! ```text
//! analyze(ctx)
//!   breaker open?          -> fallback("circuit_open")
//!   invoke engine (timed)  -> timeout:  record_failure, fallback("AI_TIMEOUT")
//!                          -> error:    record_failure, fallback(<message>)
//!   validate output        -> invalid:  record_failure, fallback("schema_invalid")
//!                          -> valid:    record_success, engine diagnosis
//! ```

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::TriageConfig;
use crate::deadline::{run_with_deadline, Timed, TIMEOUT_REASON};
use crate::engine::ReasoningEngine;
use crate::fallback::FallbackClassifier;
use crate::model::{Diagnosis, ErrorContext};
use crate::prompt::{PromptRenderer, TemplateRenderer};
use crate::validation::ResponseValidator;

/// Reason recorded when the breaker short-circuits a request
pub const CIRCUIT_OPEN_REASON: &str = "circuit_open";
/// Reason recorded when the engine output fails validation
pub const SCHEMA_INVALID_REASON: &str = "schema_invalid";
/// Reason recorded when an engine error carries no message
pub const UPSTREAM_FAILURE_REASON: &str = "upstream_failure";

/// Default deadline for one engine call
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_millis(8_000);

/// Which path produced a diagnosis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosisSource {
    /// The engine answered in time with a valid diagnosis
    Engine,
    /// The rule-based classifier answered
    Fallback { reason: String },
}

/// A diagnosis together with the path that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub diagnosis: Diagnosis,
    pub source: DiagnosisSource,
}

impl Analysis {
    /// Returns true if the rule-based classifier produced the diagnosis
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, DiagnosisSource::Fallback { .. })
    }

    /// The fallback reason, if any
    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.source {
            DiagnosisSource::Fallback { reason } => Some(reason),
            DiagnosisSource::Engine => None,
        }
    }

    pub fn into_diagnosis(self) -> Diagnosis {
        self.diagnosis
    }
}

/// Composes breaker, engine, validator and fallback into one infallible call
pub struct AnalysisOrchestrator {
    engine: Arc<dyn ReasoningEngine>,
    renderer: Arc<dyn PromptRenderer>,
    breaker: Arc<CircuitBreaker>,
    classifier: FallbackClassifier,
    validator: ResponseValidator,
    engine_timeout: Duration,
}

impl AnalysisOrchestrator {
    /// Creates an orchestrator with the default template, classifier settings
    /// and engine timeout
    pub fn new(engine: Arc<dyn ReasoningEngine>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            engine,
            renderer: Arc::new(TemplateRenderer::default()),
            breaker,
            classifier: FallbackClassifier::default(),
            validator: ResponseValidator::default(),
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }

    /// Creates an orchestrator and its breaker from loaded settings
    pub fn from_config(config: &TriageConfig, engine: Arc<dyn ReasoningEngine>) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            "reasoning-engine",
            Some(config.breaker_config()),
        ));
        Self::new(engine, breaker)
            .with_timeout(config.engine_timeout())
            .with_default_max_attempts(config.default_max_attempts)
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn PromptRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_timeout(mut self, engine_timeout: Duration) -> Self {
        self.engine_timeout = engine_timeout;
        self
    }

    /// Sets the retry budget used by both the classifier and the validator's
    /// retry-hint repair
    pub fn with_default_max_attempts(mut self, default_max_attempts: u64) -> Self {
        self.classifier = FallbackClassifier::new(default_max_attempts);
        self.validator = ResponseValidator::new(default_max_attempts);
        self
    }

    /// The shared breaker guarding the engine
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn engine_timeout(&self) -> Duration {
        self.engine_timeout
    }

    /// Produces a diagnosis for `ctx`. Never fails.
    pub async fn analyze(&self, ctx: &ErrorContext) -> Diagnosis {
        self.analyze_with_source(ctx).await.into_diagnosis()
    }

    /// Like [`analyze`](Self::analyze), also reporting which path answered
    pub async fn analyze_with_source(&self, ctx: &ErrorContext) -> Analysis {
        let span = info_span!(
            "analyze",
            correlation_id = %Uuid::new_v4(),
            flow = %ctx.flow_or_default(),
            step = %ctx.step_name,
            http_status = %ctx.http_status,
        );
        self.run(ctx).instrument(span).await
    }

    async fn run(&self, ctx: &ErrorContext) -> Analysis {
        if self.breaker.is_open() {
            return self.fall_back(ctx, CIRCUIT_OPEN_REASON, "circuit_open");
        }

        let prompt = self.renderer.render(ctx);
        let text = match run_with_deadline(self.engine_timeout, self.engine.invoke(&prompt)).await {
            Ok(Timed {
                value: Ok(text),
                elapsed,
            }) => {
                debug!(elapsed_ms = %elapsed.as_millis(), "Engine responded");
                text
            }
            Ok(Timed { value: Err(err), .. }) => {
                warn!(error = %err, transient = err.is_transient(), "Engine call failed");
                self.breaker.record_failure();
                let reason = match err.to_string() {
                    message if message.is_empty() => UPSTREAM_FAILURE_REASON.to_string(),
                    message => message,
                };
                return self.fall_back(ctx, &reason, "engine_error");
            }
            Err(elapsed) => {
                warn!(deadline_ms = %elapsed.deadline.as_millis(), "Engine call timed out");
                self.breaker.record_failure();
                return self.fall_back(ctx, TIMEOUT_REASON, "timeout");
            }
        };

        // Text that is not JSON is still validated, as a bare string
        let candidate = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        match self.validator.validate(&candidate) {
            Ok(diagnosis) => {
                self.breaker.record_success();
                counter!("triage.analysis.engine", 1);
                info!(diagnosis_type = %diagnosis.kind, "Engine diagnosis accepted");
                Analysis {
                    diagnosis,
                    source: DiagnosisSource::Engine,
                }
            }
            Err(violation) => {
                warn!(violation = %violation, "Engine output rejected");
                self.breaker.record_failure();
                self.fall_back(ctx, SCHEMA_INVALID_REASON, "schema_invalid")
            }
        }
    }

    // `cause` is a bounded label for metrics; `reason` may be a free-text
    // engine message
    fn fall_back(&self, ctx: &ErrorContext, reason: &str, cause: &'static str) -> Analysis {
        let diagnosis = self.classifier.classify(ctx, reason);
        counter!("triage.analysis.fallback", 1, "cause" => cause);
        info!(
            reason = %reason,
            diagnosis_type = %diagnosis.kind,
            retry_allowed = diagnosis.retry_hint.allowed,
            "Answered with rule-based diagnosis"
        );
        Analysis {
            diagnosis,
            source: DiagnosisSource::Fallback {
                reason: reason.to_string(),
            },
        }
    }
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("breaker", &self.breaker)
            .field("classifier", &self.classifier)
            .field("validator", &self.validator)
            .field("engine_timeout", &self.engine_timeout)
            .finish_non_exhaustive()
    }
}
