//! Request-scoped context threaded through every AuthFlow and SessionStore call.
//!
//! Carries the request id used in log spans, a hard deadline and an optional
//! cancellation signal. Store implementations route every backend round-trip
//! through [`RequestContext::run`].

use crate::cache::StoreError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

/// Deadline used when the caller does not pick one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: Uuid,
    deadline: Instant,
    cancel: Option<watch::Receiver<bool>>,
}

/// Sender half of a request's cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // No receivers left means nothing is waiting on the request anymore.
        let _ = self.tx.send(true);
    }
}

impl RequestContext {
    /// Context whose deadline is `timeout` from now
    pub fn new(timeout: Duration) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            deadline: Instant::now() + timeout,
            cancel: None,
        }
    }

    /// Context plus the handle that cancels it
    pub fn cancellable(timeout: Duration) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut ctx = Self::new(timeout);
        ctx.cancel = Some(rx);
        (ctx, CancelHandle { tx })
    }

    /// Reuse an upstream request id (e.g. from an `x-request-id` header)
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Drive `fut` unless the deadline passes or the request is cancelled first.
    ///
    /// Nothing is sent to the backend once the context is already cancelled or
    /// expired. A command already in flight when the race is lost is either fully
    /// applied or not applied at all, because every mutating store call is a
    /// single MULTI/EXEC or EVAL.
    pub async fn run<F, T, E>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<StoreError>,
    {
        if self.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(StoreError::DeadlineExceeded);
        }

        tokio::select! {
            biased;
            _ = cancelled(self.cancel.clone()) => Err(StoreError::Cancelled),
            outcome = tokio::time::timeout_at(self.deadline, fut) => match outcome {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(StoreError::DeadlineExceeded),
            },
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

async fn cancelled(rx: Option<watch::Receiver<bool>>) {
    match rx {
        Some(mut rx) => {
            // Sender dropped without cancelling: the request can no longer be cancelled.
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_through_result() {
        let ctx = RequestContext::default();
        let value = ctx.run(async { Ok::<_, StoreError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = RequestContext::new(Duration::from_millis(20));
        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_run_refuses_after_cancel() {
        let (ctx, handle) = RequestContext::cancellable(Duration::from_secs(5));
        handle.cancel();
        assert!(ctx.is_cancelled());

        let result = ctx.run(async { Ok::<_, StoreError>(()) }).await;
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_inflight_call() {
        let (ctx, handle) = RequestContext::cancellable(Duration::from_secs(5));
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, StoreError>(())
            })
            .await;
        canceller.await.unwrap();
        assert!(matches!(result, Err(StoreError::Cancelled)));
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_cancel() {
        let (ctx, handle) = RequestContext::cancellable(Duration::from_secs(5));
        drop(handle);

        let value = ctx.run(async { Ok::<_, StoreError>(1) }).await.unwrap();
        assert_eq!(value, 1);
    }
}
