//! Correlation context for request-scoped log and trace attribution
//!
//! Every inbound request gets a [`CorrelationContext`] holding two ids:
//!
//! - `correlation_id`: supplied by the caller via header or generated at the
//!   edge, shared across service hops
//! - `request_id`: always generated fresh, unique to this service's handling
//!   of the request
//!
//! The context lives in a tokio task-local cell scoped to the request's
//! future tree: everything awaited under [`with_context`] sees it, siblings
//! serving other requests never do, and it is torn down when the scope
//! future completes or is dropped (including cancellation). Task-locals do
//! not cross `tokio::spawn`; use [`propagate`] to hand the context to a
//! spawned task explicitly.

use std::future::Future;

use uuid::Uuid;

tokio::task_local! {
    static CURRENT_CONTEXT: CorrelationContext;
}

/// Correlation identifiers for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationContext {
    /// Caller-supplied or edge-generated id, stable across service hops
    pub correlation_id: String,
    /// Fresh per-request id, never reused from the caller
    pub request_id: String,
}

impl CorrelationContext {
    /// Create a context with freshly generated ids
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Adopt a caller-supplied correlation id, still generating a distinct
    /// request id
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a future with a correlation context in scope
///
/// The context is visible to the future and everything it awaits, and is
/// dropped with the scope on every exit path. Nested scopes shadow the
/// outer context until they finish.
pub async fn with_context<F>(context: CorrelationContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_CONTEXT.scope(context, fut).await
}

/// Run a future under a caller-supplied correlation id
///
/// Shorthand for [`with_context`] with a context built via
/// [`CorrelationContext::with_correlation_id`].
pub async fn with_correlation_id<F>(correlation_id: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    with_context(CorrelationContext::with_correlation_id(correlation_id), fut).await
}

/// The context in scope for the calling task, if any
pub fn current() -> Option<CorrelationContext> {
    CURRENT_CONTEXT.try_with(|context| context.clone()).ok()
}

/// The correlation id in scope for the calling task, if any
pub fn current_correlation_id() -> Option<String> {
    CURRENT_CONTEXT
        .try_with(|context| context.correlation_id.clone())
        .ok()
}

/// The request id in scope for the calling task, if any
pub fn current_request_id() -> Option<String> {
    CURRENT_CONTEXT
        .try_with(|context| context.request_id.clone())
        .ok()
}

/// Carry the calling task's context into a future destined for
/// `tokio::spawn`
///
/// Captures the current context (when one is in scope) and re-establishes
/// it around the given future, since task-locals do not survive the hop to
/// a new task on their own.
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let context = current();
    async move {
        match context {
            Some(ctx) => CURRENT_CONTEXT.scope(ctx, fut).await,
            None => fut.await,
        }
    }
}
