//! # Reasoning Engine
//!
//! The orchestrator only needs `invoke(prompt) -> text`. [`ReasoningEngine`]
//! is that seam; [`OpenAiResponsesEngine`] is the production implementation
//! talking to an OpenAI-compatible Responses endpoint with the diagnosis
//! schema attached as the structured-output format.
//!
//! Deadlines are not enforced here. The orchestrator races `invoke` against
//! its own timer; the HTTP client timeout is only a backstop for requests
//! that outlive the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::schema::{diagnosis_schema, SCHEMA_NAME};

/// External collaborator producing free-form diagnosis text
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, EngineError>;
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    text: TextOptions<'a>,
}

#[derive(Debug, Serialize)]
struct TextOptions<'a> {
    format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    schema: &'a Value,
    strict: bool,
}

/// Client for the OpenAI Responses API
#[derive(Debug, Clone)]
pub struct OpenAiResponsesEngine {
    http: Client,
    config: EngineConfig,
}

impl OpenAiResponsesEngine {
    /// Builds the engine; fails only if the HTTP client cannot be constructed
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, EngineError> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| EngineError::NotConfigured("OPENAI_API_KEY is not set".to_string()))
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiResponsesEngine {
    async fn invoke(&self, prompt: &str) -> Result<String, EngineError> {
        let api_key = self.api_key()?;

        let request = ResponsesRequest {
            model: &self.config.model,
            input: prompt,
            text: TextOptions {
                format: ResponseFormat {
                    kind: "json_schema",
                    name: SCHEMA_NAME,
                    schema: diagnosis_schema(),
                    strict: true,
                },
            },
        };

        debug!(model = %self.config.model, url = %self.config.api_url, "Invoking reasoning engine");

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = map_status_error(status, &body);
            warn!(status = %status.as_u16(), error = %err, "Reasoning engine returned an error status");
            return Err(err);
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| EngineError::Parse(e.to_string()))?;

        Ok(extract_output_text(&payload))
    }
}

/// Pulls the answer text out of a Responses payload.
///
/// Tries `output_text`, then `output[0].content[0].text`, then
/// `content[0].text`; an empty string if none are present.
pub fn extract_output_text(payload: &Value) -> String {
    payload
        .get("output_text")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/output/0/content/0/text").and_then(Value::as_str))
        .or_else(|| payload.pointer("/content/0/text").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Maps a non-success HTTP status to an engine error
pub fn map_status_error(status: StatusCode, body: &str) -> EngineError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .or_else(|| json.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                format!("{}: {:.100}", status, body)
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EngineError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => EngineError::RateLimited(message),
        s if s.is_client_error() => EngineError::InvalidRequest(message),
        s if s.is_server_error() => EngineError::Server(message),
        _ => EngineError::Upstream(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_prefers_output_text() {
        let payload = json!({
            "output_text": "{\"a\":1}",
            "output": [{ "content": [{ "text": "ignored" }] }]
        });
        assert_eq!(extract_output_text(&payload), "{\"a\":1}");
    }

    #[test]
    fn test_extract_falls_through_shapes() {
        let nested = json!({ "output": [{ "type": "message", "content": [{ "type": "output_text", "text": "nested" }] }] });
        assert_eq!(extract_output_text(&nested), "nested");

        let legacy = json!({ "content": [{ "text": "legacy" }] });
        assert_eq!(extract_output_text(&legacy), "legacy");

        assert_eq!(extract_output_text(&json!({ "id": "resp_1" })), "");
        assert_eq!(extract_output_text(&json!(null)), "");
    }

    #[test]
    fn test_status_mapping() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            map_status_error(StatusCode::UNAUTHORIZED, body),
            EngineError::Authentication("Incorrect API key provided".into())
        );
        assert!(matches!(
            map_status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            EngineError::RateLimited(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::UNPROCESSABLE_ENTITY, "{}"),
            EngineError::InvalidRequest(_)
        ));
        assert!(matches!(
            map_status_error(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            EngineError::Server(_)
        ));
    }

    #[test]
    fn test_status_mapping_plain_body() {
        let err = map_status_error(StatusCode::SERVICE_UNAVAILABLE, "upstream connect error");
        assert_eq!(
            err,
            EngineError::Server("503 Service Unavailable: upstream connect error".into())
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let engine = OpenAiResponsesEngine::new(EngineConfig {
            api_key: None,
            ..EngineConfig::default()
        })
        .unwrap();
        let err = engine.invoke("prompt").await.unwrap_err();
        assert!(matches!(err, EngineError::NotConfigured(_)));
    }
}
