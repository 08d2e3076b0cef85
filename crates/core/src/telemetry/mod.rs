//! Distributed tracing and telemetry using OpenTelemetry
//!
//! This module selects and initializes a trace exporter for the runtime
//! the service finds itself on, and bridges request handling into it via
//! actix-web middleware and span helpers.
//!
//! # Features
//!
//! - Exporter selection: console, GCP Cloud Trace, OTLP, or disabled
//! - Runtime auto-detection when no exporter is configured
//! - Graceful degradation: a broken exporter disables tracing, never startup
//! - Trace context extraction from `traceparent` headers
//! - Span creation for HTTP handlers, database queries, and outbound calls
//! - Configurable sampling rates by environment
//!
//! # Example
//!
//! ```rust,no_run
//! use apex_gateway_core::telemetry::{init_tracer, TracingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TracingConfig::from_env();
//!     let telemetry = init_tracer(&config).await?;
//!
//!     // telemetry is None when tracing is disabled or degraded
//!     drop(telemetry);
//!     Ok(())
//! }
//! ```

pub mod middleware;
pub mod spans;
pub mod tracing;

pub use self::tracing::{
    detect_exporter, effective_exporter, init_tracer, ExporterKind, TelemetryError,
    TelemetryGuard, TracingConfig,
};
pub use middleware::{
    extract_trace_context, get_correlation_id, get_request_id, RequestIdData, TraceContext,
    TracingMiddleware, CORRELATION_ID_HEADER, REQUEST_ID_HEADER, TRACEPARENT_HEADER,
};
pub use spans::{api_span, db_span, operation_span, record_error, record_success, request_span};
