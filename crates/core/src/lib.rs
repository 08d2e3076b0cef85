//! # Apex Gateway Core
//!
//! Core observability building blocks for the Apex Gateway platform.
//!
//! This crate provides the request observability pipeline shared by all
//! Apex Gateway services: correlation-scoped structured logging, sensitive
//! data redaction, platform-aware log formatting, and distributed tracing
//! with pluggable exporters.
//!
//! ## Modules
//!
//! - `observability`: Correlation context, log sanitization, formatting, and
//!   pipeline assembly
//! - `telemetry`: OpenTelemetry exporter selection, spans, and request
//!   middleware
//! - `config`: Configuration loading and validation
//! - `error`: Error types and handling

pub mod config;
pub mod error;
pub mod observability;
pub mod telemetry;

// Re-export commonly used types
pub use config::{load_dotenv, ConfigLoader, ServiceConfig};
pub use error::GatewayError;
pub use observability::{
    current_correlation_id, current_request_id, with_context, with_correlation_id,
    CorrelationContext, LogConfig, LogFormat, ObservabilityConfig, ObservabilityError,
    ObservabilityPipeline,
};
pub use telemetry::{
    api_span, db_span, extract_trace_context, get_correlation_id, get_request_id, init_tracer,
    operation_span, request_span, ExporterKind, TelemetryError, TraceContext, TracingConfig,
    TracingMiddleware,
};

/// Result type alias for Apex Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
