//! Correlation-scoped structured logging
//!
//! The observability pipeline stamps every log record with the identifiers
//! of the request that produced it, scrubs sensitive values before they
//! reach a sink, and picks an output format to match the platform the
//! service is deployed on.
//!
//! # Features
//!
//! - Task-local correlation context, visible to everything a request awaits
//! - Recursive redaction of sensitive fields and headers
//! - Console, JSON, GCP and AWS log formats with runtime auto-detection
//! - Non-blocking log writer, buffered off the request path
//! - Idempotent initialization that never fails service startup
//!
//! # Example
//!
//! ```rust,no_run
//! use apex_gateway_core::observability::{ObservabilityConfig, ObservabilityPipeline};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::from_env();
//!     let pipeline = ObservabilityPipeline::init(config).await;
//!
//!     tracing::info!("service ready");
//!
//!     if let Ok(pipeline) = pipeline {
//!         pipeline.shutdown();
//!     }
//! }
//! ```

pub mod context;
pub mod format;
pub mod pipeline;
pub mod sanitize;

pub use context::{
    current, current_correlation_id, current_request_id, with_context, with_correlation_id,
    CorrelationContext,
};
pub use format::{detect_format, resolve_format, EventFormatter, LogFormat};
pub use pipeline::{LogConfig, ObservabilityConfig, ObservabilityError, ObservabilityPipeline};
pub use sanitize::{
    build_error_context, is_sensitive_field, is_sensitive_header, sanitize_headers, sanitize_map,
    sanitize_value, REDACTED,
};
