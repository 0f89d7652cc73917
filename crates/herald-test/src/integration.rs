//! End-to-end Integration Test Suite
//!
//! Tests that drive a manager through its public surface:
//! - Attach / trigger / detach lifecycle
//! - Concurrent triggers and total order
//! - Detach racing a broadcast
//! - Slow subscribers under coalescing
//! - Observers, view models and adapters on top

use std::sync::Arc;
use std::time::Duration;

use herald_core::Outcome;
use herald_state::{Backpressure, StateManager};
use tokio::task::JoinHandle;

use crate::recorder::Recorder;
use crate::scripted::ScriptedOperation;

/// A manager bound to a scripted provider the test keeps a handle to
pub struct Fixture<V> {
    pub manager: StateManager<V>,
    pub provider: Arc<ScriptedOperation<V>>,
}

impl<V> Fixture<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(provider: ScriptedOperation<V>) -> Self {
        Self::with_policy(provider, Backpressure::Unbounded)
    }

    pub fn with_policy(provider: ScriptedOperation<V>, policy: Backpressure) -> Self {
        let provider = Arc::new(provider);
        let manager = StateManager::with_backpressure(Arc::clone(&provider), policy);
        Fixture { manager, provider }
    }

    pub fn recorder(&self) -> Recorder<V> {
        Recorder::new(self.manager.attach())
    }

    /// Start a trigger without waiting for it
    pub fn spawn_trigger(&self) -> JoinHandle<Outcome<V>> {
        let manager = self.manager.clone();
        tokio::spawn(async move { manager.trigger().await })
    }
}
