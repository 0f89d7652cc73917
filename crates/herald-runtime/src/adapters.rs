//! Operation adapters
//!
//! Wrappers that change how a provider settles without touching the
//! manager: a deadline, and cooperative cancellation reported as
//! `OperationError::Cancelled`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use herald_core::OperationError;
use herald_state::{Operation, OperationFuture};
use tokio::sync::watch;

/// Await `fut`, failing with `TimedOut` after `limit`
pub async fn within<V, F>(limit: Option<Duration>, fut: F) -> Result<V, OperationError>
where
    F: Future<Output = Result<V, OperationError>>,
{
    match limit {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(OperationError::TimedOut(limit))),
    }
}

/// Provider that fails with `TimedOut` when `inner` is too slow
pub struct WithTimeout<P> {
    inner: P,
    limit: Duration,
}

impl<P> WithTimeout<P> {
    pub fn new(inner: P, limit: Duration) -> Self {
        WithTimeout { inner, limit }
    }
}

impl<P: Operation> Operation for WithTimeout<P> {
    type Output = P::Output;

    fn run(&self) -> OperationFuture<'_, Self::Output> {
        Box::pin(within(Some(self.limit), self.inner.run()))
    }
}

/// Shared cancellation switch
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        CancelHandle { tx: Arc::new(tx) }
    }

    /// Cancel the run in flight and every later run until [`reset`](Self::reset)
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Await `fut` unless cancelled first
    pub async fn guard<V, F>(&self, fut: F) -> Result<V, OperationError>
    where
        F: Future<Output = Result<V, OperationError>>,
    {
        let mut rx = self.tx.subscribe();
        let cancelled = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(OperationError::Cancelled),
            result = fut => result,
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider whose runs can be cancelled through a [`CancelHandle`]
pub struct Cancellable<P> {
    inner: P,
    handle: CancelHandle,
}

impl<P> Cancellable<P> {
    pub fn new(inner: P) -> Self {
        Cancellable {
            inner,
            handle: CancelHandle::new(),
        }
    }

    pub fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }
}

impl<P: Operation> Operation for Cancellable<P> {
    type Output = P::Output;

    fn run(&self) -> OperationFuture<'_, Self::Output> {
        Box::pin(self.handle.guard(self.inner.run()))
    }
}
