//! Processing-function seam between the pool and its caller.
//!
//! Every worker executes the same `JobHandler` against the payloads it
//! dequeues. Implement the trait directly for stateful processors, or
//! wrap a plain async closure with [`handler_fn`].

use std::future::Future;

use async_trait::async_trait;

use crate::job::JobError;

/// The processing function executed by every worker.
///
/// A handler failure is captured in the job's result and never crashes
/// the worker; the worker moves on to the next job.
#[async_trait]
pub trait JobHandler<T: Send + 'static, O: Send + 'static>: Send + Sync {
    /// Processes one payload, returning the output value or the failure
    /// to record in the result.
    async fn handle(&self, payload: T) -> Result<O, JobError>;
}

/// Adapter wrapping an async closure as a [`JobHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wraps a plain async closure as a [`JobHandler`].
///
/// ```rust,ignore
/// let handler = handler_fn(|name: String| async move {
///     Ok(format!("processed {name}"))
/// });
/// ```
pub fn handler_fn<T, O, F, Fut>(f: F) -> FnHandler<F>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, JobError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<T, O, F, Fut> JobHandler<T, O> for FnHandler<F>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, JobError>> + Send,
{
    async fn handle(&self, payload: T) -> Result<O, JobError> {
        (self.f)(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handler_fn_success() {
        let handler = handler_fn(|n: u32| async move { Ok(n * 2) });

        let out = handler.handle(21).await.expect("handler should succeed");
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn test_handler_fn_failure() {
        let handler = handler_fn(|name: String| async move {
            Err::<String, _>(JobError::new(format!("cannot process {name}")))
        });

        let err = handler.handle("x.png".to_string()).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot process x.png");
    }
}
