//! Correlation ids for analysis requests.
//!
//! A submission enters a context once; worker threads spawned for inference
//! runs re-enter it from the captured id so their log lines correlate.

use std::cell::RefCell;
use std::future::Future;
use uuid::Uuid;

/// Correlation context for one analysis request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    request_id: String,
}

impl RequestContext {
    /// Creates a context with a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Re-creates a context from an id captured on another thread.
    #[must_use]
    pub fn from_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    /// Returns the context active on this thread or task, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        current_request_id().map(Self::from_id)
    }

    /// Returns the correlation id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

tokio::task_local! {
    static TASK_CONTEXT: RequestContext;
}

thread_local! {
    static THREAD_CONTEXT: RefCell<Option<RequestContext>> = const { RefCell::new(None) };
}

/// Restores the previously active thread context on drop.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct RequestContextGuard {
    previous: Option<RequestContext>,
}

impl Drop for RequestContextGuard {
    fn drop(&mut self) {
        THREAD_CONTEXT.with(|slot| {
            *slot.borrow_mut() = self.previous.take();
        });
    }
}

/// Makes `context` current on this thread until the guard drops.
pub fn enter_request_context(context: RequestContext) -> RequestContextGuard {
    let previous = THREAD_CONTEXT.with(|slot| slot.borrow_mut().replace(context));
    RequestContextGuard { previous }
}

/// Runs `fut` with `context` current across await points.
pub async fn scope_request_context<F, T>(context: RequestContext, fut: F) -> T
where
    F: Future<Output = T>,
{
    TASK_CONTEXT
        .scope(context.clone(), async move {
            let _guard = enter_request_context(context);
            fut.await
        })
        .await
}

/// Returns the active correlation id. Task scope wins over thread scope.
#[must_use]
pub fn current_request_id() -> Option<String> {
    if let Ok(id) = TASK_CONTEXT.try_with(|ctx| ctx.request_id.clone()) {
        return Some(id);
    }

    THREAD_CONTEXT.with(|slot| slot.borrow().as_ref().map(|ctx| ctx.request_id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_context_by_default() {
        std::thread::spawn(|| assert!(current_request_id().is_none()))
            .join()
            .unwrap();
    }

    #[test]
    fn test_guard_restores_outer_context() {
        let _outer = enter_request_context(RequestContext::from_id("outer"));
        {
            let _inner = enter_request_context(RequestContext::from_id("inner"));
            assert_eq!(current_request_id().as_deref(), Some("inner"));
        }
        assert_eq!(current_request_id().as_deref(), Some("outer"));
    }

    #[test]
    fn test_id_carries_to_worker_thread() {
        let _guard = enter_request_context(RequestContext::from_id("scan-42"));
        let captured = RequestContext::current();
        let seen = std::thread::spawn(move || {
            let _guard = captured.map(enter_request_context);
            current_request_id()
        })
        .join()
        .unwrap();
        assert_eq!(seen.as_deref(), Some("scan-42"));
    }

    #[test]
    fn test_fresh_ids_are_distinct() {
        assert_ne!(
            RequestContext::new().request_id(),
            RequestContext::new().request_id()
        );
    }

    #[tokio::test]
    async fn test_scope_survives_await() {
        let observed = scope_request_context(RequestContext::from_id("async-scan"), async {
            tokio::task::yield_now().await;
            current_request_id()
        })
        .await;
        assert_eq!(observed.as_deref(), Some("async-scan"));
    }
}
