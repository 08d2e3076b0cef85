//! Log output formats and platform auto-detection
//!
//! The pipeline emits one record per line in a format chosen once at
//! startup: explicit configuration wins, otherwise the runtime platform is
//! probed (Cloud Run/Functions, Lambda/ECS, Kubernetes) and the result is
//! cached for the process lifetime. All structured formats pass event
//! fields through the sanitizer before serialization and attach the
//! correlation ids from the active [`crate::observability::context`] scope.
//!
//! # Formats
//!
//! - `console`: human-readable single line, optional ANSI colors
//! - `json`: flat JSON record for generic log aggregation
//! - `gcp`: Cloud Logging structured record (`severity`, trace link, labels)
//! - `aws`: CloudWatch-style record (`traceId`, `requestId`, flat fields)

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use crate::observability::context;
use crate::observability::sanitize::sanitize_map;

/// Output format for log records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output for local development
    Console,
    /// Flat JSON records for generic aggregation backends
    Json,
    /// Google Cloud Logging structured records
    Gcp,
    /// AWS CloudWatch structured records
    Aws,
}

/// Error returned when a format name cannot be parsed
#[derive(Debug, Error)]
#[error("Unknown log format '{0}' (expected console, json, gcp, or aws)")]
pub struct ParseLogFormatError(String);

impl FromStr for LogFormat {
    type Err = ParseLogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            "gcp" => Ok(LogFormat::Gcp),
            "aws" => Ok(LogFormat::Aws),
            other => Err(ParseLogFormatError(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Console => "console",
            LogFormat::Json => "json",
            LogFormat::Gcp => "gcp",
            LogFormat::Aws => "aws",
        };
        f.write_str(name)
    }
}

static DETECTED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Probe the runtime platform for a suitable log format
///
/// Checked in fixed priority order: GCP serverless markers, then AWS
/// markers, then Kubernetes (which gets plain JSON), falling back to
/// console output for local development.
pub fn detect_format() -> LogFormat {
    detect_format_with(env_present)
}

fn detect_format_with(present: impl Fn(&str) -> bool) -> LogFormat {
    if present("K_SERVICE") || present("GOOGLE_CLOUD_PROJECT") {
        return LogFormat::Gcp;
    }
    if present("AWS_LAMBDA_FUNCTION_NAME")
        || present("AWS_EXECUTION_ENV")
        || present("ECS_CONTAINER_METADATA_URI_V4")
    {
        return LogFormat::Aws;
    }
    if present("KUBERNETES_SERVICE_HOST") {
        return LogFormat::Json;
    }
    LogFormat::Console
}

/// Resolve the format to use: explicit configuration wins, otherwise the
/// detection result, computed once and cached for the process lifetime
pub fn resolve_format(explicit: Option<LogFormat>) -> LogFormat {
    match explicit {
        Some(format) => format,
        None => *DETECTED_FORMAT.get_or_init(detect_format),
    }
}

fn env_present(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
}

fn level_label(level: &Level) -> &'static str {
    if *level == Level::ERROR {
        "ERROR"
    } else if *level == Level::WARN {
        "WARN"
    } else if *level == Level::INFO {
        "INFO"
    } else if *level == Level::DEBUG {
        "DEBUG"
    } else {
        "TRACE"
    }
}

/// Fixed level-to-severity table for Cloud Logging
fn gcp_severity(level: &Level) -> &'static str {
    if *level == Level::ERROR {
        "ERROR"
    } else if *level == Level::WARN {
        "WARNING"
    } else if *level == Level::INFO {
        "INFO"
    } else {
        // TRACE has no Cloud Logging equivalent, it maps down to DEBUG
        "DEBUG"
    }
}

fn level_color(level: &Level) -> &'static str {
    if *level == Level::ERROR {
        "\x1b[31m"
    } else if *level == Level::WARN {
        "\x1b[33m"
    } else if *level == Level::INFO {
        "\x1b[32m"
    } else if *level == Level::DEBUG {
        "\x1b[34m"
    } else {
        "\x1b[35m"
    }
}

const ANSI_RESET: &str = "\x1b[0m";

/// Collects event fields into a JSON map, separating out the message
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
            return;
        }
        // Internal fields: leading underscore by our convention, "log."
        // metadata from the log-crate bridge
        if name.starts_with('_') || name.starts_with("log.") {
            return;
        }
        self.fields.insert(name.to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, json!(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, json!(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, json!(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, json!(format!("{:?}", value)));
    }
}

/// Event formatter rendering one of the [`LogFormat`] shapes
///
/// Used as the `event_format` of the fmt layer. Structured variants emit a
/// single JSON object per line; the console variant renders a plain text
/// line. Fields are sanitized before they reach the writer.
pub struct EventFormatter {
    format: LogFormat,
    project_id: Option<String>,
    ansi: bool,
}

impl EventFormatter {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            project_id: None,
            ansi: false,
        }
    }

    /// GCP project id used to build the Cloud Logging trace resource name
    pub fn with_project_id(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    /// Enable ANSI colors on console output
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    fn write_console(
        &self,
        writer: &mut Writer<'_>,
        timestamp: &str,
        level: &Level,
        target: &str,
        message: &str,
        fields: &Map<String, Value>,
    ) -> fmt::Result {
        if self.ansi {
            write!(
                writer,
                "{} {}{:>5}{} {}: {}",
                timestamp,
                level_color(level),
                level_label(level),
                ANSI_RESET,
                target,
                message
            )?;
        } else {
            write!(
                writer,
                "{} {:>5} {}: {}",
                timestamp,
                level_label(level),
                target,
                message
            )?;
        }

        if let Some(ctx) = context::current() {
            write!(
                writer,
                " correlation_id={} request_id={}",
                ctx.correlation_id, ctx.request_id
            )?;
        }
        for (key, value) in fields {
            write!(writer, " {}={}", key, value)?;
        }
        writeln!(writer)
    }
}

impl<S, N> FormatEvent<S, N> for EventFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let message = visitor.message.unwrap_or_default();
        let fields = sanitize_map(&visitor.fields);

        match self.format {
            LogFormat::Console => {
                return self.write_console(
                    &mut writer,
                    &timestamp,
                    metadata.level(),
                    metadata.target(),
                    &message,
                    &fields,
                );
            }
            LogFormat::Json => {
                let mut record = Map::new();
                record.insert("timestamp".to_string(), json!(timestamp));
                record.insert("level".to_string(), json!(level_label(metadata.level())));
                record.insert("message".to_string(), json!(message));
                record.insert("logger".to_string(), json!(metadata.target()));
                if let Some(module) = metadata.module_path() {
                    record.insert("module".to_string(), json!(module));
                }
                if let Some(line) = metadata.line() {
                    record.insert("line".to_string(), json!(line));
                }
                if let Some(ctx) = context::current() {
                    record.insert("correlation_id".to_string(), json!(ctx.correlation_id));
                    record.insert("request_id".to_string(), json!(ctx.request_id));
                }
                for (key, value) in fields {
                    record.entry(key).or_insert(value);
                }
                writeln!(writer, "{}", Value::Object(record))
            }
            LogFormat::Gcp => {
                let mut record = Map::new();
                record.insert(
                    "severity".to_string(),
                    json!(gcp_severity(metadata.level())),
                );
                record.insert("message".to_string(), json!(message));
                record.insert("timestamp".to_string(), json!(timestamp));
                record.insert("logger".to_string(), json!(metadata.target()));
                if !fields.is_empty() {
                    record.insert("payload".to_string(), Value::Object(fields));
                }
                if let Some(ctx) = context::current() {
                    let trace = match &self.project_id {
                        Some(project) => {
                            format!("projects/{}/traces/{}", project, ctx.correlation_id)
                        }
                        None => ctx.correlation_id.clone(),
                    };
                    record.insert("logging.googleapis.com/trace".to_string(), json!(trace));
                    record.insert(
                        "logging.googleapis.com/labels".to_string(),
                        json!({ "request_id": ctx.request_id }),
                    );
                }
                writeln!(writer, "{}", Value::Object(record))
            }
            LogFormat::Aws => {
                let mut record = Map::new();
                record.insert("timestamp".to_string(), json!(timestamp));
                record.insert("level".to_string(), json!(level_label(metadata.level())));
                record.insert("message".to_string(), json!(message));
                record.insert("logger".to_string(), json!(metadata.target()));
                if let Some(ctx) = context::current() {
                    record.insert("traceId".to_string(), json!(ctx.correlation_id));
                    record.insert("requestId".to_string(), json!(ctx.request_id));
                }
                for (key, value) in fields {
                    record.entry(key).or_insert(value);
                }
                writeln!(writer, "{}", Value::Object(record))
            }
        }
    }
}
