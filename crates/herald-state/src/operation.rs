//! Operation providers
//!
//! A provider is the asynchronous work a manager runs on `trigger()`. It is
//! object safe so managers can hold `Arc<dyn Operation<Output = V>>` and
//! tests can swap in scripted providers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use herald_core::OperationError;

/// Boxed future returned by providers
pub type OperationFuture<'a, V> =
    Pin<Box<dyn Future<Output = Result<V, OperationError>> + Send + 'a>>;

/// An asynchronous operation that yields a value or fails
pub trait Operation: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Start one run of the operation
    fn run(&self) -> OperationFuture<'_, Self::Output>;
}

impl<P> Operation for Arc<P>
where
    P: Operation + ?Sized,
{
    type Output = P::Output;

    fn run(&self) -> OperationFuture<'_, Self::Output> {
        (**self).run()
    }
}

/// Provider built from an async closure, see [`from_fn`]
#[derive(Clone)]
pub struct FnOperation<F> {
    f: F,
}

/// Build a provider from a closure returning a future
pub fn from_fn<F, Fut, V>(f: F) -> FnOperation<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, OperationError>> + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    FnOperation { f }
}

impl<F, Fut, V> Operation for FnOperation<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, OperationError>> + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Output = V;

    fn run(&self) -> OperationFuture<'_, V> {
        Box::pin((self.f)())
    }
}
