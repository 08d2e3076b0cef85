//! Observability pipeline assembly and initialization
//!
//! [`ObservabilityPipeline::init`] wires the whole request observability
//! stack in one call: the env-filtered subscriber, the format-aware event
//! renderer writing through a non-blocking queue, and the optional
//! OpenTelemetry layer for the selected trace exporter. Initialization is
//! idempotent and never fails the process over its own misconfiguration;
//! degraded components are reported and skipped.
//!
//! The returned pipeline owns the log writer and tracer guards. Keep it
//! alive for the lifetime of the service and drop (or [`shutdown`]) it to
//! flush both.
//!
//! [`shutdown`]: ObservabilityPipeline::shutdown
//!
//! # Example
//!
//! ```rust,no_run
//! use apex_gateway_core::observability::{ObservabilityConfig, ObservabilityPipeline};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::from_env();
//!     let _pipeline = ObservabilityPipeline::init(config)
//!         .await
//!         .expect("observability init");
//!
//!     tracing::info!("service starting");
//! }
//! ```

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::observability::format::{resolve_format, EventFormatter, LogFormat};
use crate::telemetry::tracing::{
    effective_exporter, init_tracer, ExporterKind, TelemetryGuard, TracingConfig,
};

/// Errors surfaced to programmatic pipeline callers
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Invalid log level '{level}': {reason}")]
    InvalidLogLevel { level: String, reason: String },
}

/// Structured logging configuration
///
/// # Environment Variables
///
/// - `APEX_GATEWAY_LOG_LEVEL` (optional): level filter, `RUST_LOG` syntax
///   accepted (default: "info", `RUST_LOG` used as fallback)
/// - `APEX_GATEWAY_LOG_FORMAT` (optional): `console`, `json`, `gcp`, or
///   `aws`; unset means platform auto-detection
/// - `APEX_GATEWAY_LOG_ANSI` (optional): colorize console output
///   (default: false)
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level filter; plain level or full `RUST_LOG` directive string
    pub level: String,
    /// Explicit output format; `None` auto-detects from the platform
    pub format: Option<LogFormat>,
    /// ANSI colors on console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            ansi: false,
        }
    }
}

impl LogConfig {
    /// Load from environment variables
    ///
    /// Malformed values degrade to defaults with a warning; startup is
    /// never blocked on logging configuration.
    pub fn from_env() -> Self {
        let level = std::env::var("APEX_GATEWAY_LOG_LEVEL")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());

        let format = match std::env::var("APEX_GATEWAY_LOG_FORMAT") {
            Ok(value) if !value.is_empty() => match value.parse::<LogFormat>() {
                Ok(format) => Some(format),
                Err(e) => {
                    eprintln!("Warning: {}, falling back to auto-detection", e);
                    None
                }
            },
            _ => None,
        };

        let ansi = std::env::var("APEX_GATEWAY_LOG_ANSI")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            level,
            format,
            ansi,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ObservabilityError> {
        // Directive strings ("api=debug,info") are handed to EnvFilter
        // as-is; only bare levels are checked here.
        if self.level.contains('=') || self.level.contains(',') {
            return Ok(());
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ObservabilityError::InvalidLogLevel {
                level: self.level.clone(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }
        Ok(())
    }
}

/// Full observability configuration: logging plus trace export
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    pub log: LogConfig,
    pub trace: TracingConfig,
}

impl ObservabilityConfig {
    /// Load logging and tracing configuration from the environment
    pub fn from_env() -> Self {
        Self {
            log: LogConfig::from_env(),
            trace: TracingConfig::from_env(),
        }
    }
}

static PIPELINE_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Handle to the initialized observability pipeline
///
/// Owns the non-blocking log writer guard and the tracer provider guard;
/// dropping the pipeline flushes buffered log records and pending spans.
pub struct ObservabilityPipeline {
    format: LogFormat,
    _log_guard: Option<WorkerGuard>,
    _telemetry: Option<TelemetryGuard>,
}

impl ObservabilityPipeline {
    /// Initialize the process-wide observability pipeline
    ///
    /// Idempotent: the first call installs the subscriber, later calls
    /// return an inert handle. A foreign subscriber already being
    /// installed is reported on stderr and tolerated; the pipeline is
    /// never the reason a service fails to start.
    pub async fn init(config: ObservabilityConfig) -> Result<Self, ObservabilityError> {
        let format = resolve_format(config.log.format);

        if PIPELINE_INITIALIZED.set(()).is_err() {
            tracing::debug!("Observability pipeline already initialized, skipping");
            return Ok(Self::inert(format));
        }

        let env_filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|e| {
            eprintln!(
                "Warning: invalid log level '{}' ({}), using 'info'",
                config.log.level, e
            );
            EnvFilter::new("info")
        });

        let (writer, log_guard) = tracing_appender::non_blocking(std::io::stdout());
        let formatter = EventFormatter::new(format)
            .with_project_id(config.trace.project_id.clone())
            .with_ansi(config.log.ansi);
        let fmt_layer = tracing_subscriber::fmt::layer()
            .event_format(formatter)
            .with_writer(writer);

        let exporter = effective_exporter(&config.trace);
        let telemetry = match init_tracer(&config.trace).await {
            Ok(telemetry) => telemetry,
            Err(e) => {
                eprintln!("Warning: trace exporter unavailable: {}", e);
                None
            }
        };
        let (otel_layer, telemetry_guard) = match telemetry {
            Some((tracer, guard)) => (
                Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                Some(guard),
            ),
            None => (None, None),
        };
        let tracing_enabled = telemetry_guard.is_some();

        let registry = tracing_subscriber::registry()
            .with(env_filter)
            .with(otel_layer)
            .with(fmt_layer);

        if let Err(e) = registry.try_init() {
            // Someone else owns the subscriber. Keep the guards so any
            // exporter we built still flushes on drop.
            eprintln!("Warning: logging subscriber already set: {}", e);
            return Ok(Self {
                format,
                _log_guard: Some(log_guard),
                _telemetry: telemetry_guard,
            });
        }

        if !tracing_enabled && exporter != ExporterKind::Disabled {
            tracing::warn!(
                exporter = %exporter,
                "Trace exporter unavailable or not configured, tracing disabled"
            );
        }
        tracing::info!(
            format = %format,
            exporter = %exporter,
            tracing_enabled,
            "Observability pipeline initialized"
        );

        Ok(Self {
            format,
            _log_guard: Some(log_guard),
            _telemetry: telemetry_guard,
        })
    }

    /// The log format the pipeline resolved at startup
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Flush buffered log records and pending spans
    pub fn shutdown(self) {
        tracing::info!("Shutting down observability pipeline");
        drop(self);
    }

    fn inert(format: LogFormat) -> Self {
        Self {
            format,
            _log_guard: None,
            _telemetry: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, None);
        assert!(!config.ansi);
    }

    #[test]
    fn test_log_config_from_env() {
        std::env::set_var("APEX_GATEWAY_LOG_LEVEL", "debug");
        std::env::set_var("APEX_GATEWAY_LOG_FORMAT", "json");
        std::env::set_var("APEX_GATEWAY_LOG_ANSI", "true");

        let config = LogConfig::from_env();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, Some(LogFormat::Json));
        assert!(config.ansi);

        // Unknown format names degrade to auto-detection, not an error
        std::env::set_var("APEX_GATEWAY_LOG_FORMAT", "syslog");
        assert_eq!(LogConfig::from_env().format, None);

        std::env::remove_var("APEX_GATEWAY_LOG_LEVEL");
        std::env::remove_var("APEX_GATEWAY_LOG_FORMAT");
        std::env::remove_var("APEX_GATEWAY_LOG_ANSI");
    }

    #[test]
    fn test_log_config_validation() {
        let mut config = LogConfig::default();
        assert!(config.validate().is_ok());

        config.level = "warn".to_string();
        assert!(config.validate().is_ok());

        // Directive strings pass through for EnvFilter to interpret
        config.level = "apex_gateway_core=debug,info".to_string();
        assert!(config.validate().is_ok());

        config.level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ObservabilityError::InvalidLogLevel { .. }));
    }

    #[tokio::test]
    async fn test_pipeline_init_is_idempotent() {
        let config = ObservabilityConfig {
            log: LogConfig::default(),
            trace: TracingConfig {
                exporter: Some(ExporterKind::Disabled),
                ..TracingConfig::default()
            },
        };

        let first = ObservabilityPipeline::init(config.clone()).await;
        assert!(first.is_ok());

        // Second call is a no-op, not an error
        let second = ObservabilityPipeline::init(config).await;
        assert!(second.is_ok());
    }
}
