//! Helpers for non-critical side work: event-log appends, identity
//! mapping sync, outbound mail. Failures are logged with a context tag
//! and swallowed; the primary transaction never depends on them.

use std::future::Future;

use crate::error::Result;

/// Run a fallible side operation that must not abort the main flow.
pub fn best_effort_sync<T>(context: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(context, error = %e, "best-effort task failed (continuing)");
            None
        }
    }
}

/// Async variant of [`best_effort_sync`].
pub async fn best_effort<T, F>(context: &'static str, fut: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    best_effort_sync(context, fut.await)
}
