//! Span constructors carrying correlation identity and OTel conventions
//!
//! Spans created here declare their dynamic fields up front so that later
//! `record` calls land; a field recorded on a span that never declared it
//! is silently dropped by `tracing`.

use tracing::field::Empty;
use tracing::Span;

use crate::observability::context;

const MAX_STATEMENT_LEN: usize = 200;

/// Root span for an inbound HTTP request
///
/// Correlation and trace fields start empty; the request middleware
/// records them once the request context is established.
pub fn request_span(method: &str, path: &str, version: &str) -> Span {
    tracing::info_span!(
        "http.request",
        http.method = %method,
        http.target = %path,
        http.version = %version,
        http.status_code = Empty,
        otel.kind = "server",
        otel.status_code = Empty,
        error.message = Empty,
        correlation_id = Empty,
        request_id = Empty,
        trace.trace_id = Empty,
        trace.span_id = Empty,
    )
}

/// Span for a named unit of work inside a request
pub fn operation_span(name: &str) -> Span {
    let span = tracing::info_span!(
        "operation",
        operation = %name,
        correlation_id = Empty,
        request_id = Empty,
        otel.status_code = Empty,
        error.message = Empty,
    );
    stamp_correlation(&span);
    span
}

/// Span for a database query, statement truncated to a loggable length
pub fn db_span(statement: &str, table: &str) -> Span {
    let span = tracing::debug_span!(
        "db.query",
        db.statement = %truncate_statement(statement),
        db.table = %table,
        otel.kind = "client",
        correlation_id = Empty,
        request_id = Empty,
        otel.status_code = Empty,
        error.message = Empty,
    );
    stamp_correlation(&span);
    span
}

/// Span for an outbound call to another service
pub fn api_span(service: &str, method: &str, url: &str) -> Span {
    let span = tracing::info_span!(
        "http.client",
        peer.service = %service,
        http.method = %method,
        http.url = %url,
        otel.kind = "client",
        correlation_id = Empty,
        request_id = Empty,
        otel.status_code = Empty,
        error.message = Empty,
    );
    stamp_correlation(&span);
    span
}

/// Mark the current span failed and attach the error message
pub fn record_error(error: &dyn std::error::Error) {
    let span = Span::current();
    span.record("otel.status_code", "ERROR");
    span.record("error.message", tracing::field::display(error));
}

/// Mark the current span completed successfully
pub fn record_success() {
    Span::current().record("otel.status_code", "OK");
}

fn stamp_correlation(span: &Span) {
    if let Some(ctx) = context::current() {
        span.record("correlation_id", ctx.correlation_id.as_str());
        span.record("request_id", ctx.request_id.as_str());
    }
}

fn truncate_statement(statement: &str) -> String {
    if statement.len() <= MAX_STATEMENT_LEN {
        return statement.to_string();
    }
    // The cut must land on a char boundary or the slice panics
    let mut cut = MAX_STATEMENT_LEN - 3;
    while !statement.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &statement[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::context::with_context;
    use crate::observability::CorrelationContext;

    fn with_subscriber<T>(f: impl FnOnce() -> T) -> T {
        // Spans need an active subscriber or their metadata is stripped
        tracing::subscriber::with_default(tracing_subscriber::registry(), f)
    }

    #[test]
    fn test_request_span_metadata() {
        with_subscriber(|| {
            let span = request_span("GET", "/api/v1/status", "HTTP/1.1");
            let metadata = span.metadata().unwrap();
            assert_eq!(metadata.name(), "http.request");
            assert_eq!(*metadata.level(), tracing::Level::INFO);
        });
    }

    #[test]
    fn test_operation_span_metadata() {
        with_subscriber(|| {
            let span = operation_span("sync_profiles");
            let metadata = span.metadata().unwrap();
            assert_eq!(metadata.name(), "operation");
            assert_eq!(*metadata.level(), tracing::Level::INFO);
        });
    }

    #[test]
    fn test_db_span_is_debug_level() {
        with_subscriber(|| {
            let span = db_span("SELECT * FROM users WHERE id = $1", "users");
            let metadata = span.metadata().unwrap();
            assert_eq!(metadata.name(), "db.query");
            assert_eq!(*metadata.level(), tracing::Level::DEBUG);
        });
    }

    #[test]
    fn test_api_span_metadata() {
        with_subscriber(|| {
            let span = api_span("billing", "POST", "https://billing.internal/charge");
            let metadata = span.metadata().unwrap();
            assert_eq!(metadata.name(), "http.client");
            assert_eq!(*metadata.level(), tracing::Level::INFO);
        });
    }

    #[test]
    fn test_truncate_statement_long_query() {
        let long_query = "SELECT ".to_string() + &"x, ".repeat(100);
        let truncated = truncate_statement(&long_query);

        assert_eq!(truncated.len(), MAX_STATEMENT_LEN);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_statement_short_query() {
        let query = "SELECT 1";
        assert_eq!(truncate_statement(query), query);
    }

    #[test]
    fn test_truncate_statement_multibyte_boundary() {
        // Place a two-byte char exactly across the cut position; the
        // truncation must back up to the previous boundary, not panic
        let mut statement = "x".repeat(MAX_STATEMENT_LEN - 4);
        statement.push('é');
        statement.push_str(&"y".repeat(50));

        let truncated = truncate_statement(&statement);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= MAX_STATEMENT_LEN);
        assert!(!truncated.contains('é'));
    }

    #[test]
    fn test_db_span_multibyte_statement() {
        with_subscriber(|| {
            // Char boundaries here are all even, so the odd cut position
            // lands inside a char
            let statement = "é".repeat(150);
            let span = db_span(&statement, "menus");
            assert!(span.metadata().is_some());
        });
    }

    #[tokio::test]
    async fn test_span_helpers_inside_context() {
        let ctx = CorrelationContext::new();
        with_context(ctx, async {
            with_subscriber(|| {
                // Stamping must not panic whether or not a context is set
                let span = operation_span("indexing");
                assert!(span.metadata().is_some());
            });
        })
        .await;
    }

    #[test]
    fn test_record_helpers_without_span() {
        with_subscriber(|| {
            // Recording outside any span is a no-op, never a panic
            record_success();
            let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
            record_error(&err);
        });
    }
}
