//! Span helpers for application and request context.
//!
//! # Design
//! - Request identifiers live in task-local storage so nested spans can read them.
//! - The application span guard carries mode and build info for the process lifetime.

use std::future::Future;
use std::sync::Arc;

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Guard that keeps the application-level span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    #[must_use]
    /// Enter the application-level tracing span for the lifetime of the guard.
    pub fn new(mode: impl Into<String>) -> Self {
        let mode = mode.into();
        let span: &'static Span = Box::leak(Box::new(
            tracing::info_span!("app", mode = %mode, build_sha = %build_sha()),
        ));
        let guard = span.enter();
        Self { _guard: guard }
    }
}

/// Retrieve the request identifier of the current task, if one is set.
#[must_use]
pub fn current_request_id() -> Option<String> {
    ACTIVE_REQUEST_ID
        .try_with(|request_id| request_id.as_ref().to_string())
        .ok()
}

/// Execute `fut` with `request_id` visible to [`current_request_id`].
pub async fn with_request_context<Fut, T>(request_id: impl Into<String>, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    ACTIVE_REQUEST_ID
        .scope(Arc::from(request_id.into()), fut)
        .await
}

tokio::task_local! {
    static ACTIVE_REQUEST_ID: Arc<str>;
}
