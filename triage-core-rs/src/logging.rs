//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. Per-request correlation ids are
//! carried as span fields by the orchestrator, so nothing here is
//! request-scoped.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::error::{Result, TriageError};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Flushes the file writer when the process exits
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Targets that are too chatty at the service's own level
const QUIET_TARGETS: [&str; 3] = ["hyper", "reqwest", "h2"];

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name, also used as the log file prefix
    pub service_name: String,
    /// Whether to output logs to a file
    pub file_output: bool,
    /// The directory to store log files in
    pub log_dir: Option<String>,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Whether to include file and line of the call site
    pub include_source_code: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "unknown-service".to_string(),
            file_output: false,
            log_dir: None,
            json_format: true,
            include_source_code: true,
        }
    }
}

/// Filter directives used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));
    directives.join(",")
}

/// Initializes the structured logging system.
///
/// Subsequent calls are no-ops. Fails if another subscriber was already
/// installed as the global default.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<()> {
    // Don't re-initialize if already done
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.level)))
        .map_err(|e| TriageError::Logging(format!("Invalid log level {:?}: {}", config.level, e)))?;

    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_file(config.include_source_code)
            .with_line_number(config.include_source_code)
    });

    let text_layer = (!config.json_format).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_source_code)
            .with_line_number(config.include_source_code)
    });

    let file_layer = match (config.file_output, config.log_dir.as_deref()) {
        (true, Some(log_dir)) => {
            let appender =
                tracing_appender::rolling::daily(log_dir, format!("{}.log", config.service_name));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // Only the first initialization gets here, so the cell is empty
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        _ => None,
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TriageError::Logging(format!("Failed to set global subscriber: {}", e)))?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = %config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}

/// Returns true once [`init_logging`] has installed a subscriber
pub fn is_initialized() -> bool {
    LOGGING_INITIALIZED.load(Ordering::SeqCst)
}

impl TryFrom<config::Config> for LoggingConfig {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> std::result::Result<Self, Self::Error> {
        // Start from defaults and selectively override from the provided config.
        let mut base = LoggingConfig::default();

        if let Ok(level) = cfg.get::<String>("logging.level") {
            base.level = level;
        }
        if let Ok(service_name) = cfg.get::<String>("logging.service_name") {
            base.service_name = service_name;
        }
        if let Ok(file_output) = cfg.get::<bool>("logging.file_output") {
            base.file_output = file_output;
        }
        if let Ok(log_dir) = cfg.get::<String>("logging.log_dir") {
            base.log_dir = Some(log_dir);
        }
        if let Ok(json_format) = cfg.get::<bool>("logging.json_format") {
            base.json_format = json_format;
        }
        if let Ok(include_source_code) = cfg.get::<bool>("logging.include_source_code") {
            base.include_source_code = include_source_code;
        }

        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_quiet_http_stack() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("hyper=warn"));
        assert!(directives.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }

    #[test]
    fn test_config_overrides() {
        let cfg = config::Config::builder()
            .set_override("logging.level", "trace")
            .unwrap()
            .set_override("logging.json_format", false)
            .unwrap()
            .set_override("logging.log_dir", "/var/log/triage")
            .unwrap()
            .build()
            .unwrap();

        let logging = LoggingConfig::try_from(cfg).unwrap();
        assert_eq!(logging.level, "trace");
        assert!(!logging.json_format);
        assert_eq!(logging.log_dir.as_deref(), Some("/var/log/triage"));
        assert!(!logging.file_output);
        assert_eq!(logging.service_name, "unknown-service");
    }

    #[test]
    fn test_init_is_idempotent_once_installed() {
        // Another test may already own the global subscriber
        if init_logging(None).is_ok() {
            assert!(is_initialized());
            assert!(init_logging(Some(LoggingConfig {
                level: "not a level ===".to_string(),
                ..LoggingConfig::default()
            }))
            .is_ok());
        }
    }
}
