//! String fetch feature

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use herald_core::{OperationError, Outcome, SubscriberId};
use herald_state::{Backpressure, Operation, OperationFuture, StateManager, Subscription};

use crate::adapters::within;

pub type StringFuture<'a> = Pin<Box<dyn Future<Output = Result<String, OperationError>> + Send + 'a>>;

/// Backend serving strings by key
pub trait StringBackend: Send + Sync + 'static {
    fn fetch<'a>(&'a self, key: &'a str) -> StringFuture<'a>;
}

struct FetchString {
    backend: Arc<dyn StringBackend>,
    key: String,
    timeout: Option<Duration>,
}

impl Operation for FetchString {
    type Output = String;

    fn run(&self) -> OperationFuture<'_, String> {
        Box::pin(within(self.timeout, self.backend.fetch(&self.key)))
    }
}

/// String state manager bound to one key
#[derive(Clone)]
pub struct StringFeature {
    manager: StateManager<String>,
    backend: Arc<dyn StringBackend>,
    key: String,
    timeout: Option<Duration>,
}

impl StringFeature {
    pub fn new(
        backend: Arc<dyn StringBackend>,
        key: impl Into<String>,
        policy: Backpressure,
        timeout: Option<Duration>,
    ) -> Self {
        let key = key.into();
        let fetch = FetchString {
            backend: Arc::clone(&backend),
            key: key.clone(),
            timeout,
        };
        StringFeature {
            manager: StateManager::with_backpressure(fetch, policy),
            backend,
            key,
            timeout,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn manager(&self) -> &StateManager<String> {
        &self.manager
    }

    pub fn attach(&self) -> Subscription<String> {
        self.manager.attach()
    }

    pub fn detach(&self, id: SubscriberId) -> bool {
        self.manager.detach(id)
    }

    /// Fetch the configured key
    pub async fn fetch(&self) -> Outcome<String> {
        self.manager.trigger().await
    }

    /// Fetch another key through the same manager
    pub async fn fetch_key(&self, key: impl Into<String>) -> Outcome<String> {
        let backend = Arc::clone(&self.backend);
        let key = key.into();
        let timeout = self.timeout;
        self.manager
            .trigger_with(async move { within(timeout, backend.fetch(&key)).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Table(HashMap<&'static str, &'static str>);

    impl StringBackend for Table {
        fn fetch<'a>(&'a self, key: &'a str) -> StringFuture<'a> {
            Box::pin(async move {
                self.0
                    .get(key)
                    .map(|value| value.to_string())
                    .ok_or_else(|| OperationError::failed(format!("no string for {key:?}")))
            })
        }
    }

    struct Stalled;

    impl StringBackend for Stalled {
        fn fetch<'a>(&'a self, _key: &'a str) -> StringFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    fn table() -> Arc<dyn StringBackend> {
        Arc::new(Table(HashMap::from([("greeting", "hello"), ("farewell", "bye")])))
    }

    #[tokio::test]
    async fn test_fetch_bound_key() {
        let strings = StringFeature::new(table(), "greeting", Backpressure::default(), None);
        let mut sub = strings.attach();

        assert_eq!(strings.fetch().await, Outcome::Succeeded("hello".to_string()));
        assert_eq!(sub.recv().await, Some(Outcome::Idle));
        assert_eq!(sub.recv().await, Some(Outcome::Pending));
        assert_eq!(sub.recv().await, Some(Outcome::Succeeded("hello".to_string())));
    }

    #[tokio::test]
    async fn test_fetch_other_and_missing_keys() {
        let strings = StringFeature::new(table(), "greeting", Backpressure::default(), None);

        assert_eq!(
            strings.fetch_key("farewell").await,
            Outcome::Succeeded("bye".to_string())
        );
        assert_eq!(
            strings.fetch_key("motd").await,
            Outcome::Failed(OperationError::failed("no string for \"motd\""))
        );
    }

    #[tokio::test]
    async fn test_stalled_backend_times_out() {
        let limit = Duration::from_millis(10);
        let strings = StringFeature::new(Arc::new(Stalled), "greeting", Backpressure::default(), Some(limit));

        assert_eq!(
            strings.fetch().await,
            Outcome::Failed(OperationError::TimedOut(limit))
        );
    }
}
