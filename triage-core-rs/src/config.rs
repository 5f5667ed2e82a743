//! # Configuration
//!
//! Settings consumed by the triage core. They can come from the process
//! environment (optionally seeded by a `.env` file) or from a layered
//! `config::Config` built by the embedding service.
//!
//! Environment variables:
//! - `FS_MAX_ATTEMPTS_DEFAULT`: retry budget for retryable diagnoses (default: 6)
//! - `CB_THRESHOLD`: consecutive engine failures that open the breaker (default: 3)
//! - `CB_COOLDOWN_MS`: how long the breaker stays open (default: 60000)
//! - `OPENAI_TIMEOUT_MS`: deadline for one engine call (default: 8000)
//! - `OPENAI_API_KEY`, `OPENAI_MODEL` (default: gpt-4o-mini), `OPENAI_API_URL`
//! - `LOG_LEVEL` (default: info), `LOG_JSON` (default: true)

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{Result, TriageError};
use crate::logging::LoggingConfig;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/responses";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Connection settings for the reasoning engine
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub api_url: String,
    pub model: String,
    #[serde(skip_serializing, default)]
    pub api_key: Option<String>,
    /// Transport-level backstop; the orchestrator deadline is normally shorter
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            request_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// All settings recognized by the triage core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Retry budget granted when a retry is allowed
    pub default_max_attempts: u64,
    pub breaker_threshold: u32,
    pub breaker_cooldown_ms: u64,
    /// Deadline for a single engine call
    pub engine_timeout_ms: u64,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 6,
            breaker_threshold: 3,
            breaker_cooldown_ms: 60_000,
            engine_timeout_ms: 8_000,
            engine: EngineConfig::default(),
            logging: LoggingConfig {
                service_name: "error-triage".to_string(),
                ..LoggingConfig::default()
            },
        }
    }
}

impl TriageConfig {
    /// Loads settings from the environment, reading `.env` first if present
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        Self {
            default_max_attempts: get_env_var("FS_MAX_ATTEMPTS_DEFAULT", defaults.default_max_attempts),
            breaker_threshold: get_env_var("CB_THRESHOLD", defaults.breaker_threshold),
            breaker_cooldown_ms: get_env_var("CB_COOLDOWN_MS", defaults.breaker_cooldown_ms),
            engine_timeout_ms: get_env_var("OPENAI_TIMEOUT_MS", defaults.engine_timeout_ms),
            engine: EngineConfig {
                api_url: env::var("OPENAI_API_URL").unwrap_or(defaults.engine.api_url),
                model: env::var("OPENAI_MODEL").unwrap_or(defaults.engine.model),
                api_key: env::var("OPENAI_API_KEY").ok().filter(|key| !key.is_empty()),
                request_timeout_secs: defaults.engine.request_timeout_secs,
            },
            logging: LoggingConfig {
                level: env::var("LOG_LEVEL").unwrap_or(defaults.logging.level),
                json_format: get_env_var("LOG_JSON", defaults.logging.json_format),
                ..defaults.logging
            },
        }
    }

    /// Rejects settings the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine_timeout_ms == 0 {
            return Err(TriageError::InvalidValue(
                "engine_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.breaker_threshold == 0 {
            return Err(TriageError::InvalidValue(
                "breaker_threshold must be greater than zero".to_string(),
            ));
        }
        // A retryable diagnosis must always grant at least one attempt
        if self.default_max_attempts == 0 {
            return Err(TriageError::InvalidValue(
                "default_max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            threshold: self.breaker_threshold,
            cooldown: Duration::from_millis(self.breaker_cooldown_ms),
        }
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }
}

// Reads and parses an environment variable, keeping the default when the
// variable is unset or unparseable
fn get_env_var<T: FromStr + fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!(variable = %name, value = %raw, default = %default, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

// Missing keys keep the current value; present but mistyped keys are errors
fn override_from<T>(cfg: &config::Config, key: &str, target: &mut T) -> Result<()>
where
    T: for<'de> Deserialize<'de>,
{
    match cfg.get::<T>(key) {
        Ok(value) => {
            *target = value;
            Ok(())
        }
        Err(config::ConfigError::NotFound(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

impl TryFrom<config::Config> for TriageConfig {
    type Error = TriageError;

    fn try_from(cfg: config::Config) -> std::result::Result<Self, Self::Error> {
        // Start from defaults and selectively override from the provided config.
        let mut base = TriageConfig::default();

        override_from(&cfg, "triage.default_max_attempts", &mut base.default_max_attempts)?;
        override_from(&cfg, "triage.breaker_threshold", &mut base.breaker_threshold)?;
        override_from(&cfg, "triage.breaker_cooldown_ms", &mut base.breaker_cooldown_ms)?;
        override_from(&cfg, "triage.engine_timeout_ms", &mut base.engine_timeout_ms)?;

        override_from(&cfg, "engine.api_url", &mut base.engine.api_url)?;
        override_from(&cfg, "engine.model", &mut base.engine.model)?;
        override_from(&cfg, "engine.request_timeout_secs", &mut base.engine.request_timeout_secs)?;
        if let Ok(key) = cfg.get::<String>("engine.api_key") {
            base.engine.api_key = Some(key).filter(|key| !key.is_empty());
        }

        base.logging = LoggingConfig::try_from(cfg)?;
        if base.logging.service_name == LoggingConfig::default().service_name {
            base.logging.service_name = TriageConfig::default().logging.service_name;
        }

        Ok(base)
    }
}
