//! Trace exporter selection and OpenTelemetry initialization

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_sdk::trace::Sampler;
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use url::Url;

/// Default local collector address for the OTLP exporter
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// Telemetry configuration errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to initialize trace exporter: {0}")]
    ExporterInit(String),

    #[error("Invalid sampling rate: {0} (must be between 0.0 and 1.0)")]
    InvalidSamplingRate(f64),

    #[error("Invalid OTLP endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Which backend receives exported spans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterKind {
    /// Spans printed to stdout, for local development
    Console,
    /// Google Cloud Trace (requires the `gcp-trace` build feature)
    Gcp,
    /// OTLP over gRPC to a collector
    Otlp,
    /// No span export at all
    Disabled,
}

/// Error returned when an exporter name cannot be parsed
#[derive(Debug, Error)]
#[error("Unknown trace exporter '{0}' (expected console, gcp, otlp, or none)")]
pub struct ParseExporterError(String);

impl FromStr for ExporterKind {
    type Err = ParseExporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" => Ok(ExporterKind::Console),
            "gcp" => Ok(ExporterKind::Gcp),
            "otlp" => Ok(ExporterKind::Otlp),
            "none" => Ok(ExporterKind::Disabled),
            other => Err(ParseExporterError(other.to_string())),
        }
    }
}

impl fmt::Display for ExporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExporterKind::Console => "console",
            ExporterKind::Gcp => "gcp",
            ExporterKind::Otlp => "otlp",
            ExporterKind::Disabled => "none",
        };
        f.write_str(name)
    }
}

/// Configuration for distributed tracing
///
/// # Environment Variables
///
/// - `APEX_GATEWAY_SERVICE_NAME` (optional): service identifier
///   (`OTEL_SERVICE_NAME` fallback, default: "apex-gateway")
/// - `APEX_GATEWAY_TRACE_EXPORTER` (optional): `console`, `gcp`, `otlp`,
///   or `none`; unset means runtime auto-detection
/// - `APEX_GATEWAY_OTLP_ENDPOINT` (optional): collector address
///   (`OTEL_EXPORTER_OTLP_ENDPOINT` fallback, default local collector)
/// - `APEX_GATEWAY_GCP_PROJECT_ID` (optional): Cloud Trace project
///   (`GOOGLE_CLOUD_PROJECT` fallback)
/// - `APEX_GATEWAY_TRACE_SAMPLE_RATE` (optional): 0.0 to 1.0; defaults to
///   1.0, or 0.1 when `RUST_ENV=production`
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name for trace identification
    pub service_name: String,

    /// Explicit exporter selection; `None` auto-detects from the runtime
    pub exporter: Option<ExporterKind>,

    /// OTLP collector endpoint
    pub otlp_endpoint: String,

    /// GCP project id, required by the gcp exporter
    pub project_id: Option<String>,

    /// Sampling rate: 0.0 to 1.0 (0.1 = 10%, 1.0 = 100%)
    pub sampling_rate: f64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "apex-gateway".to_string(),
            exporter: None,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            project_id: None,
            sampling_rate: 1.0,
        }
    }
}

impl TracingConfig {
    /// Create config from environment variables
    ///
    /// Malformed values degrade to defaults rather than failing startup;
    /// an unknown exporter name falls back to auto-detection with a
    /// warning.
    pub fn from_env() -> Self {
        let service_name = std::env::var("APEX_GATEWAY_SERVICE_NAME")
            .or_else(|_| std::env::var("OTEL_SERVICE_NAME"))
            .unwrap_or_else(|_| "apex-gateway".to_string());

        let exporter = match std::env::var("APEX_GATEWAY_TRACE_EXPORTER") {
            Ok(value) if !value.is_empty() => match value.parse::<ExporterKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    eprintln!("Warning: {}, falling back to auto-detection", e);
                    None
                }
            },
            _ => None,
        };

        let otlp_endpoint = std::env::var("APEX_GATEWAY_OTLP_ENDPOINT")
            .or_else(|_| std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT"))
            .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());

        let project_id = std::env::var("APEX_GATEWAY_GCP_PROJECT_ID")
            .or_else(|_| std::env::var("GOOGLE_CLOUD_PROJECT"))
            .ok()
            .filter(|v| !v.is_empty());

        let is_production = std::env::var("RUST_ENV")
            .map(|e| e == "production")
            .unwrap_or(false);

        let sampling_rate = std::env::var("APEX_GATEWAY_TRACE_SAMPLE_RATE")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or_else(|| default_sampling_rate(is_production));

        Self {
            service_name,
            exporter,
            otlp_endpoint,
            project_id,
            sampling_rate,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.sampling_rate < 0.0 || self.sampling_rate > 1.0 {
            return Err(TelemetryError::InvalidSamplingRate(self.sampling_rate));
        }
        Url::parse(&self.otlp_endpoint).map_err(|e| TelemetryError::InvalidEndpoint {
            endpoint: self.otlp_endpoint.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Probe the runtime for a suitable trace exporter
///
/// A configured OTLP collector endpoint wins, then GCP runtime markers;
/// everything else falls back to console spans for local development.
pub fn detect_exporter() -> ExporterKind {
    detect_exporter_with(env_present)
}

fn detect_exporter_with(present: impl Fn(&str) -> bool) -> ExporterKind {
    if present("OTEL_EXPORTER_OTLP_ENDPOINT") {
        return ExporterKind::Otlp;
    }
    if present("K_SERVICE") || present("GOOGLE_CLOUD_PROJECT") {
        return ExporterKind::Gcp;
    }
    ExporterKind::Console
}

/// The exporter the given config resolves to: explicit selection wins,
/// otherwise runtime detection
pub fn effective_exporter(config: &TracingConfig) -> ExporterKind {
    config.exporter.unwrap_or_else(detect_exporter)
}

fn env_present(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Production traces at 10% by default, everything else at 100%
fn default_sampling_rate(is_production: bool) -> f64 {
    if is_production {
        0.1
    } else {
        1.0
    }
}

/// Owns the tracer provider for the process
///
/// Dropping the guard shuts down the global provider, flushing pending
/// spans through the exporter.
#[derive(Debug)]
pub struct TelemetryGuard {
    _provider: sdktrace::TracerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        global::shutdown_tracer_provider();
    }
}

/// Initialize the selected trace exporter
///
/// Returns the tracer to bridge into the logging subscriber plus the guard
/// owning the provider, or `None` when tracing is disabled - explicitly,
/// by an unmet exporter requirement, or by an exporter construction
/// failure. Exporter problems are warnings, never startup failures; only
/// invalid configuration values (sampling rate, endpoint syntax) surface
/// as errors to programmatic callers.
pub async fn init_tracer(
    config: &TracingConfig,
) -> Result<Option<(sdktrace::Tracer, TelemetryGuard)>, TelemetryError> {
    config.validate()?;

    let kind = effective_exporter(config);
    let provider = match build_provider(kind, config).await {
        Ok(Some(provider)) => provider,
        Ok(None) => return Ok(None),
        Err(e) => {
            tracing::warn!(
                error = %e,
                exporter = %kind,
                "Trace exporter construction failed, tracing disabled"
            );
            return Ok(None);
        }
    };

    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider.clone());

    tracing::debug!(
        exporter = %kind,
        sampling_rate = config.sampling_rate,
        "Trace exporter ready"
    );

    Ok(Some((
        tracer,
        TelemetryGuard {
            _provider: provider,
        },
    )))
}

async fn build_provider(
    kind: ExporterKind,
    config: &TracingConfig,
) -> Result<Option<sdktrace::TracerProvider>, TelemetryError> {
    match kind {
        ExporterKind::Disabled => Ok(None),
        ExporterKind::Console => {
            let provider = sdktrace::TracerProvider::builder()
                .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
                .with_config(trace_config(config))
                .build();
            Ok(Some(provider))
        }
        ExporterKind::Otlp => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(config.otlp_endpoint.clone())
                .with_timeout(Duration::from_secs(5))
                .build_span_exporter()
                .map_err(|e| TelemetryError::ExporterInit(e.to_string()))?;
            let provider = sdktrace::TracerProvider::builder()
                .with_batch_exporter(exporter, runtime::Tokio)
                .with_config(trace_config(config))
                .build();
            Ok(Some(provider))
        }
        ExporterKind::Gcp => build_gcp_provider(config).await,
    }
}

#[cfg(feature = "gcp-trace")]
async fn build_gcp_provider(
    config: &TracingConfig,
) -> Result<Option<sdktrace::TracerProvider>, TelemetryError> {
    use opentelemetry_stackdriver::{GcpAuthorizer, StackDriverExporter};

    if config.project_id.is_none() {
        tracing::warn!("GCP trace exporter requires a project id, tracing disabled");
        return Ok(None);
    }

    let authorizer = GcpAuthorizer::new()
        .await
        .map_err(|e| TelemetryError::ExporterInit(e.to_string()))?;
    let (exporter, driver) = StackDriverExporter::builder()
        .build(authorizer)
        .await
        .map_err(|e| TelemetryError::ExporterInit(e.to_string()))?;
    tokio::spawn(driver);

    let provider = sdktrace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(trace_config(config))
        .build();
    Ok(Some(provider))
}

#[cfg(not(feature = "gcp-trace"))]
async fn build_gcp_provider(
    _config: &TracingConfig,
) -> Result<Option<sdktrace::TracerProvider>, TelemetryError> {
    tracing::warn!(
        "GCP trace exporter selected but this build does not include it \
         (enable the gcp-trace feature), tracing disabled"
    );
    Ok(None)
}

fn trace_config(config: &TracingConfig) -> sdktrace::Config {
    sdktrace::Config::default()
        .with_sampler(build_sampler(config.sampling_rate))
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]))
}

/// Probabilistic head sampler: 1.0 keeps every trace, 0.0 keeps none.
/// Parent decisions are respected for propagated traces.
fn build_sampler(sampling_rate: f64) -> Sampler {
    Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(sampling_rate)))
}
