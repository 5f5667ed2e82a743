//! End-to-end orchestrator scenarios
//!
//! Engines are scripted in-process: `mockall` where call counts matter, small
//! hand-written engines where the behavior is timing.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::{json, Value};

    use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, ManualClock};
    use crate::engine::ReasoningEngine;
    use crate::error::EngineError;
    use crate::model::{DiagnosisType, ErrorContext};
    use crate::orchestrator::{AnalysisOrchestrator, DiagnosisSource};
    use crate::validation::ResponseValidator;

    mock! {
        pub Engine {}

        #[async_trait]
        impl ReasoningEngine for Engine {
            async fn invoke(&self, prompt: &str) -> Result<String, EngineError>;
        }
    }

    /// Answers after a fixed delay
    struct SlowEngine {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReasoningEngine for SlowEngine {
        async fn invoke(&self, _prompt: &str) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(engine_answer("connectivity").to_string())
        }
    }

    fn engine_answer(kind: &str) -> Value {
        json!({
            "flow": "OrderToCash",
            "type": kind,
            "description": "The OAuth client secret for S4HANA has expired.",
            "root_causes": ["Expired client secret in the OAuth2 credential"],
            "suggested_fix": [
                "Renew the client secret in the S/4 communication arrangement",
                "Redeploy the security material and reprocess"
            ],
            "retry_hint": { "allowed": false, "after_seconds": 0, "max_attempts": 0 },
            "requires_manual": true,
            "signals": { "http_status": "403", "target_system": "S4HANA", "step": "Call S/4 API" }
        })
    }

    fn ctx(status: &str) -> ErrorContext {
        ErrorContext::new("OrderToCash")
            .step("Call S/4 API")
            .target_system("S4HANA")
            .http_status(status)
            .error_message("Request failed")
            .attempts(1)
    }

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::default())
    }

    fn answering(answer: String) -> MockEngine {
        let mut engine = MockEngine::new();
        engine
            .expect_invoke()
            .times(1)
            .returning(move |_| Ok(answer.clone()));
        engine
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenario_timeout_falls_back_to_connectivity() {
        let engine = Arc::new(SlowEngine {
            delay: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = AnalysisOrchestrator::new(engine.clone(), breaker());

        let analysis = orchestrator.analyze_with_source(&ctx("503")).await;
        let diagnosis = &analysis.diagnosis;

        assert_eq!(analysis.fallback_reason(), Some("AI_TIMEOUT"));
        assert_eq!(diagnosis.kind, DiagnosisType::Connectivity);
        assert!(diagnosis.retry_hint.allowed);
        assert_eq!(diagnosis.retry_hint.after_seconds, 60);
        assert_eq!(diagnosis.retry_hint.max_attempts, 6);
        assert!(!diagnosis.requires_manual);
        assert_eq!(diagnosis.root_causes[0], "AI_TIMEOUT");
        assert_eq!(orchestrator.breaker().consecutive_failures(), 1);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_within_deadline_is_accepted() {
        let engine = Arc::new(SlowEngine {
            delay: Duration::from_secs(2),
            calls: AtomicUsize::new(0),
        });
        let orchestrator = AnalysisOrchestrator::new(engine, breaker());

        let analysis = orchestrator.analyze_with_source(&ctx("503")).await;

        assert_eq!(analysis.source, DiagnosisSource::Engine);
        assert_eq!(analysis.diagnosis.kind, DiagnosisType::Connectivity);
    }

    #[test_log::test(tokio::test)]
    async fn test_scenario_open_circuit_skips_engine() {
        let mut engine = MockEngine::new();
        engine.expect_invoke().never();

        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert!(breaker.is_open());

        let orchestrator = AnalysisOrchestrator::new(Arc::new(engine), breaker);
        let diagnosis = orchestrator.analyze(&ctx("500")).await;

        assert!(diagnosis.root_causes.contains(&"circuit_open".to_string()));
        assert_eq!(diagnosis.kind, DiagnosisType::Connectivity);
        assert_eq!(orchestrator.breaker().consecutive_failures(), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_scenario_valid_engine_answer_passes_through() {
        let answer = engine_answer("authentication");
        let raw = answer.to_string();

        let mut engine = MockEngine::new();
        engine
            .expect_invoke()
            .withf(|prompt| prompt.contains("HTTP status: 403"))
            .times(1)
            .returning(move |_| Ok(raw.clone()));

        let breaker = breaker();
        breaker.record_failure();
        breaker.record_failure();

        let orchestrator = AnalysisOrchestrator::new(Arc::new(engine), breaker);
        let analysis = orchestrator.analyze_with_source(&ctx("403")).await;

        assert_eq!(analysis.source, DiagnosisSource::Engine);
        assert_eq!(serde_json::to_value(&analysis.diagnosis).unwrap(), answer);
        assert_eq!(analysis.diagnosis.kind, DiagnosisType::Authentication);
        assert_eq!(orchestrator.breaker().consecutive_failures(), 0);
        assert!(!orchestrator.breaker().is_open());
    }

    #[test_log::test(tokio::test)]
    async fn test_scenario_unknown_type_is_schema_invalid() {
        let answer = engine_answer("not_a_real_type").to_string();
        let orchestrator = AnalysisOrchestrator::new(Arc::new(answering(answer)), breaker());

        let analysis = orchestrator.analyze_with_source(&ctx("400")).await;
        let diagnosis = &analysis.diagnosis;

        assert_eq!(analysis.fallback_reason(), Some("schema_invalid"));
        assert_eq!(diagnosis.kind, DiagnosisType::PayloadMapping);
        assert!(diagnosis.requires_manual);
        assert!(!diagnosis.retry_hint.allowed);
        assert_eq!(
            diagnosis.description,
            "Rule-based decision (schema_invalid) for status 400"
        );
        assert_eq!(orchestrator.breaker().consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_non_json_answer_is_schema_invalid() {
        let answer = "Sure! Here is my analysis: the token expired.".to_string();
        let orchestrator = AnalysisOrchestrator::new(Arc::new(answering(answer)), breaker());

        let analysis = orchestrator.analyze_with_source(&ctx("401")).await;

        assert_eq!(analysis.fallback_reason(), Some("schema_invalid"));
        assert_eq!(analysis.diagnosis.kind, DiagnosisType::Authentication);
        assert_eq!(orchestrator.breaker().consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_retry_hint_repaired_on_engine_answer() {
        let mut answer = engine_answer("connectivity");
        answer["retry_hint"] = json!({ "allowed": true, "after_seconds": 30, "max_attempts": 0 });
        let orchestrator = AnalysisOrchestrator::new(Arc::new(answering(answer.to_string())), breaker())
            .with_default_max_attempts(4);

        let analysis = orchestrator.analyze_with_source(&ctx("503")).await;

        assert_eq!(analysis.source, DiagnosisSource::Engine);
        let hint = analysis.diagnosis.retry_hint;
        assert!(hint.allowed);
        assert_eq!(hint.after_seconds, 30);
        assert_eq!(hint.max_attempts, 4);
    }

    #[tokio::test]
    async fn test_engine_error_message_is_reason() {
        let mut engine = MockEngine::new();
        engine
            .expect_invoke()
            .times(1)
            .returning(|_| Err(EngineError::upstream("socket hang up")));
        let orchestrator = AnalysisOrchestrator::new(Arc::new(engine), breaker());

        let analysis = orchestrator.analyze_with_source(&ctx("502")).await;

        assert_eq!(analysis.fallback_reason(), Some("socket hang up"));
        assert_eq!(analysis.diagnosis.root_causes[0], "socket hang up");
        assert_eq!(orchestrator.breaker().consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_empty_engine_error_is_upstream_failure() {
        let mut engine = MockEngine::new();
        engine
            .expect_invoke()
            .times(1)
            .returning(|_| Err(EngineError::upstream("")));
        let orchestrator = AnalysisOrchestrator::new(Arc::new(engine), breaker());

        let analysis = orchestrator.analyze_with_source(&ctx("")).await;

        assert_eq!(analysis.fallback_reason(), Some("upstream_failure"));
        assert_eq!(analysis.diagnosis.kind, DiagnosisType::Unknown);
        assert_eq!(
            analysis.diagnosis.root_causes,
            vec!["upstream_failure", "http_status=0", "step=Call S/4 API"]
        );
    }

    #[tokio::test]
    async fn test_repeated_failures_open_then_cooldown_recovers() {
        let clock = Arc::new(ManualClock::new(5_000_000));
        let breaker = Arc::new(CircuitBreaker::with_clock(
            "reasoning-engine",
            Some(CircuitBreakerConfig {
                threshold: 3,
                cooldown: Duration::from_millis(60_000),
            }),
            clock.clone(),
        ));

        let calls = AtomicUsize::new(0);
        let mut engine = MockEngine::new();
        engine.expect_invoke().times(4).returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(EngineError::Server("503 Service Unavailable".into()))
            } else {
                Ok(engine_answer("authentication").to_string())
            }
        });

        let orchestrator = AnalysisOrchestrator::new(Arc::new(engine), breaker);

        for _ in 0..3 {
            let analysis = orchestrator.analyze_with_source(&ctx("503")).await;
            assert!(analysis.is_fallback());
        }
        assert!(orchestrator.breaker().is_open());

        let skipped = orchestrator.analyze_with_source(&ctx("503")).await;
        assert_eq!(skipped.fallback_reason(), Some("circuit_open"));

        clock.advance(Duration::from_millis(59_999));
        assert!(orchestrator.breaker().is_open());
        clock.advance(Duration::from_millis(1));

        let recovered = orchestrator.analyze_with_source(&ctx("403")).await;
        assert_eq!(recovered.source, DiagnosisSource::Engine);
        assert_eq!(orchestrator.breaker().snapshot().open_until_ms, 0);
    }

    #[tokio::test]
    async fn test_concurrent_analyses_share_breaker() {
        let mut engine = MockEngine::new();
        engine
            .expect_invoke()
            .returning(|_| Err(EngineError::Network("connection reset".into())));

        let breaker = Arc::new(CircuitBreaker::new(
            "reasoning-engine",
            Some(CircuitBreakerConfig {
                threshold: 100,
                cooldown: Duration::from_secs(60),
            }),
        ));
        let orchestrator = Arc::new(AnalysisOrchestrator::new(Arc::new(engine), breaker));

        let tasks = (0..20).map(|i| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .analyze(&ErrorContext::new(format!("Flow{}", i)).http_status(504))
                    .await
            })
        });
        let diagnoses = futures::future::join_all(tasks).await;

        for diagnosis in diagnoses {
            let diagnosis = diagnosis.unwrap();
            assert_eq!(diagnosis.kind, DiagnosisType::Connectivity);
            assert!(ResponseValidator::default()
                .is_valid(&serde_json::to_value(&diagnosis).unwrap()));
        }
        assert_eq!(orchestrator.breaker().consecutive_failures(), 20);
        assert!(!orchestrator.breaker().is_open());
    }
}
