//! Actix-web middleware wiring requests into the observability pipeline
//!
//! Every request gets a correlation context (adopted from
//! `x-correlation-id` or freshly generated), a root span, and start /
//! completion log records. The context is installed as a task-local so
//! handlers and anything they await see the same identifiers without
//! passing them around.

use std::future::{ready, Ready};
use std::time::Instant;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use tracing::{Instrument, Span};

use crate::observability::context::{with_context, CorrelationContext};
use crate::telemetry::spans;

/// Correlation ID header, adopted from the caller when present
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request ID header, always generated server-side
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// W3C Trace Context header name
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Actix-web middleware for request observability
///
/// Automatically:
/// - Adopts the caller's correlation ID or generates one
/// - Generates a fresh request ID for every request
/// - Creates a span per request and scopes the correlation context to it
/// - Emits start and completion log records with status and duration
/// - Echoes both identifiers on the response
///
/// # Example
///
/// ```rust,no_run
/// use actix_web::{App, HttpServer};
/// use apex_gateway_core::telemetry::TracingMiddleware;
///
/// #[actix_web::main]
/// async fn main() -> std::io::Result<()> {
///     HttpServer::new(|| {
///         App::new()
///             .wrap(TracingMiddleware)
///     })
///     .bind("127.0.0.1:8080")?
///     .run()
///     .await
/// }
/// ```
#[derive(Clone)]
pub struct TracingMiddleware;

impl<S, B> Transform<S, ServiceRequest> for TracingMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = TracingMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TracingMiddlewareService { service }))
    }
}

pub struct TracingMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for TracingMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let started = Instant::now();

        // Adopt the caller's correlation ID; the request ID is always ours
        let context = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(CorrelationContext::with_correlation_id)
            .unwrap_or_default();

        let method = req.method().to_string();
        let path = req.path().to_string();
        let version = format!("{:?}", req.version());

        let span = spans::request_span(&method, &path, &version);
        span.record("correlation_id", context.correlation_id.as_str());
        span.record("request_id", context.request_id.as_str());

        if let Some(trace) = extract_trace_context(&req) {
            span.record("trace.trace_id", trace.trace_id.as_str());
            span.record("trace.span_id", trace.span_id.as_str());
        }

        // Store identifiers in extensions for handler access
        req.extensions_mut().insert(RequestIdData {
            correlation_id: context.correlation_id.clone(),
            request_id: context.request_id.clone(),
        });

        let fut = self.service.call(req);
        let correlation_id = context.correlation_id.clone();
        let request_id = context.request_id.clone();

        let inner = {
            let span = span.clone();
            async move {
                tracing::info!(
                    http.method = %method,
                    http.target = %path,
                    "Request started"
                );

                let mut guard = AbortGuard::new(
                    span.clone(),
                    correlation_id.clone(),
                    request_id.clone(),
                );

                match fut.await {
                    Ok(mut res) => {
                        guard.disarm();

                        let status = res.status().as_u16();
                        span.record("http.status_code", status);
                        insert_id_headers(&mut res, &correlation_id, &request_id);

                        let duration_ms = started.elapsed().as_millis() as u64;
                        if let Some(err) = res.response().error() {
                            span.record("otel.status_code", "ERROR");
                            span.record("error.message", tracing::field::display(err));
                            tracing::error!(
                                http.method = %method,
                                http.target = %path,
                                http.status_code = status,
                                duration_ms,
                                error.message = %err,
                                "Request failed"
                            );
                        } else {
                            if res.status().is_server_error() {
                                span.record("otel.status_code", "ERROR");
                            } else {
                                span.record("otel.status_code", "OK");
                            }
                            tracing::info!(
                                http.method = %method,
                                http.target = %path,
                                http.status_code = status,
                                duration_ms,
                                "Request completed"
                            );
                        }

                        Ok(res)
                    }
                    Err(err) => {
                        guard.disarm();

                        // Log the failure but hand the error back untouched
                        let status = err.as_response_error().status_code().as_u16();
                        span.record("http.status_code", status);
                        span.record("otel.status_code", "ERROR");
                        span.record("error.message", tracing::field::display(&err));

                        let duration_ms = started.elapsed().as_millis() as u64;
                        tracing::error!(
                            http.method = %method,
                            http.target = %path,
                            http.status_code = status,
                            duration_ms,
                            error.message = %err,
                            "Request failed"
                        );

                        Err(err)
                    }
                }
            }
        };

        Box::pin(with_context(context, inner.instrument(span)))
    }
}

fn insert_id_headers<B>(res: &mut ServiceResponse<B>, correlation_id: &str, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        res.headers_mut()
            .insert(HeaderName::from_static(CORRELATION_ID_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        res.headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}

/// Flags a request whose future was dropped before producing a response,
/// such as a client disconnect. Disarmed on both completion paths.
struct AbortGuard {
    span: Span,
    correlation_id: String,
    request_id: String,
    armed: bool,
}

impl AbortGuard {
    fn new(span: Span, correlation_id: String, request_id: String) -> Self {
        Self {
            span,
            correlation_id,
            request_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.span.record("otel.status_code", "ERROR");
        self.span.record("error.message", "request aborted");
        // The task-local context is gone by the time drop runs, so the
        // identifiers go on the event explicitly
        self.span.in_scope(|| {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                request_id = %self.request_id,
                "Request aborted before completion"
            );
        });
    }
}

/// Correlation identifiers stored in request extensions
#[derive(Clone, Debug)]
pub struct RequestIdData {
    pub correlation_id: String,
    pub request_id: String,
}

/// Correlation ID for the given request, if the middleware ran
pub fn get_correlation_id(req: &actix_web::HttpRequest) -> Option<String> {
    req.extensions()
        .get::<RequestIdData>()
        .map(|data| data.correlation_id.clone())
}

/// Request ID for the given request, if the middleware ran
pub fn get_request_id(req: &actix_web::HttpRequest) -> Option<String> {
    req.extensions()
        .get::<RequestIdData>()
        .map(|data| data.request_id.clone())
}

/// Trace context extracted from W3C traceparent header
#[derive(Debug, Clone)]
pub struct TraceContext {
    /// Version of trace context format (00 for W3C standard)
    pub version: String,

    /// Trace ID (32 hex characters)
    pub trace_id: String,

    /// Parent span ID (16 hex characters)
    pub span_id: String,

    /// Trace flags (01 = sampled, 00 = not sampled)
    pub trace_flags: String,
}

/// Extract W3C trace context from incoming request headers
///
/// Parses the `traceparent` header following W3C Trace Context specification:
/// `{version}-{trace-id}-{parent-id}-{trace-flags}`
///
/// # Example
///
/// ```rust
/// use actix_web::test::TestRequest;
/// use apex_gateway_core::telemetry::extract_trace_context;
///
/// let req = TestRequest::default()
///     .insert_header((
///         "traceparent",
///         "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"
///     ))
///     .to_srv_request();
///
/// let context = extract_trace_context(&req);
/// assert!(context.is_some());
/// ```
pub fn extract_trace_context(req: &ServiceRequest) -> Option<TraceContext> {
    let traceparent = req.headers().get(TRACEPARENT_HEADER)?.to_str().ok()?;

    parse_traceparent(traceparent)
}

/// Parse W3C traceparent header value
fn parse_traceparent(value: &str) -> Option<TraceContext> {
    let parts: Vec<&str> = value.split('-').collect();

    if parts.len() != 4 {
        tracing::warn!("Invalid traceparent format: {}", value);
        return None;
    }

    if parts[1].len() != 32 || parts[2].len() != 16 {
        tracing::warn!("Invalid traceparent id lengths: {}", value);
        return None;
    }

    Some(TraceContext {
        version: parts[0].to_string(),
        trace_id: parts[1].to_string(),
        span_id: parts[2].to_string(),
        trace_flags: parts[3].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpRequest, HttpResponse};
    use uuid::Uuid;

    async fn test_handler() -> HttpResponse {
        HttpResponse::Ok().body("test")
    }

    async fn echo_correlation_handler(req: HttpRequest) -> HttpResponse {
        let correlation = get_correlation_id(&req).unwrap_or_default();
        HttpResponse::Ok().body(correlation)
    }

    async fn failing_handler() -> Result<HttpResponse, Error> {
        Err(actix_web::error::ErrorInternalServerError("handler blew up"))
    }

    #[actix_web::test]
    async fn test_middleware_generates_both_ids() {
        let app = test::init_service(
            App::new()
                .wrap(TracingMiddleware)
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 200);

        let correlation = resp
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap();
        let request_id = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap();

        assert!(Uuid::parse_str(correlation).is_ok());
        assert!(Uuid::parse_str(request_id).is_ok());
        assert_ne!(correlation, request_id);
    }

    #[actix_web::test]
    async fn test_middleware_adopts_correlation_id() {
        let app = test::init_service(
            App::new()
                .wrap(TracingMiddleware)
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header((CORRELATION_ID_HEADER, "corr-from-caller"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        let correlation = resp
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap();
        assert_eq!(correlation, "corr-from-caller");
    }

    #[actix_web::test]
    async fn test_middleware_ignores_supplied_request_id() {
        let app = test::init_service(
            App::new()
                .wrap(TracingMiddleware)
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header((REQUEST_ID_HEADER, "caller-supplied"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        // Request IDs are never adopted from the caller
        let request_id = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .unwrap();
        assert_ne!(request_id, "caller-supplied");
        assert!(Uuid::parse_str(request_id).is_ok());
    }

    #[actix_web::test]
    async fn test_handler_sees_correlation_id() {
        let app = test::init_service(
            App::new()
                .wrap(TracingMiddleware)
                .route("/echo", web::get().to(echo_correlation_handler)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/echo")
            .insert_header((CORRELATION_ID_HEADER, "corr-visible"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        let body = test::read_body(resp).await;

        assert_eq!(body, "corr-visible");
    }

    #[actix_web::test]
    async fn test_middleware_with_traceparent() {
        let app = test::init_service(
            App::new()
                .wrap(TracingMiddleware)
                .route("/test", web::get().to(test_handler)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header((
                TRACEPARENT_HEADER,
                "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), 200);
    }

    #[actix_web::test]
    async fn test_handler_error_becomes_response_with_ids() {
        let app = test::init_service(
            App::new()
                .wrap(TracingMiddleware)
                .route("/fail", web::get().to(failing_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/fail").to_request();
        let resp = test::call_service(&app, req).await;

        // The error response still carries correlation headers
        assert_eq!(resp.status(), 500);
        assert!(resp.headers().get(CORRELATION_ID_HEADER).is_some());
        assert!(resp.headers().get(REQUEST_ID_HEADER).is_some());
    }

    #[actix_web::test]
    async fn test_middleware_reraises_service_error() {
        let app = test::init_service(
            App::new()
                .route("/fail", web::get().to(test_handler))
                .wrap_fn(|req, srv| {
                    let fail = req.path() == "/fail";
                    let fut = srv.call(req);
                    async move {
                        if fail {
                            Err(actix_web::error::ErrorImATeapot("inner failure"))
                        } else {
                            fut.await
                        }
                    }
                })
                .wrap(TracingMiddleware),
        )
        .await;

        let req = test::TestRequest::get().uri("/fail").to_request();
        let err = app.call(req).await.unwrap_err();

        assert_eq!(err.to_string(), "inner failure");
    }

    #[actix_web::test]
    async fn test_parse_traceparent_valid() {
        let traceparent = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";
        let context = parse_traceparent(traceparent);

        assert!(context.is_some());
        let ctx = context.unwrap();
        assert_eq!(ctx.version, "00");
        assert_eq!(ctx.trace_id, "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(ctx.span_id, "b7ad6b7169203331");
        assert_eq!(ctx.trace_flags, "01");
    }

    #[actix_web::test]
    async fn test_parse_traceparent_invalid() {
        // Missing parts
        assert!(parse_traceparent("00-abc123").is_none());

        // Too many parts
        assert!(parse_traceparent("00-a-b-c-d-e").is_none());

        // Wrong id lengths
        assert!(parse_traceparent("00-abc-def-01").is_none());

        // Empty string
        assert!(parse_traceparent("").is_none());
    }

    #[actix_web::test]
    async fn test_extract_trace_context() {
        let req = test::TestRequest::default()
            .insert_header((
                TRACEPARENT_HEADER,
                "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            ))
            .to_srv_request();

        let context = extract_trace_context(&req);
        assert!(context.is_some());

        let ctx = context.unwrap();
        assert_eq!(ctx.trace_id, "0af7651916cd43dd8448eb211c80319c");
    }

    #[actix_web::test]
    async fn test_extract_trace_context_no_header() {
        let req = test::TestRequest::default().to_srv_request();
        let context = extract_trace_context(&req);
        assert!(context.is_none());
    }

    #[actix_web::test]
    async fn test_request_id_data_clone() {
        let data = RequestIdData {
            correlation_id: "corr-1".to_string(),
            request_id: "req-1".to_string(),
        };
        let copy = data.clone();
        assert_eq!(data.correlation_id, copy.correlation_id);
        assert_eq!(data.request_id, copy.request_id);
    }
}
