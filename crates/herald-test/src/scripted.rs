//! Scripted operation providers

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use herald_core::OperationError;
use herald_state::{Operation, OperationFuture};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

/// Holds runs until released
#[derive(Clone, Debug)]
pub struct Gate {
    permits: Arc<Semaphore>,
}

impl Gate {
    pub fn new() -> Self {
        Gate {
            permits: Arc::new(Semaphore::new(0)),
        }
    }

    /// Let `n` waiting (or future) runs through
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    pub async fn wait(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// One scripted run
#[derive(Clone, Debug)]
pub struct Step<V> {
    pub delay: Duration,
    pub result: Result<V, OperationError>,
    pub gate: Option<Gate>,
}

impl<V> Step<V> {
    pub fn succeed(value: V) -> Self {
        Step {
            delay: Duration::ZERO,
            result: Ok(value),
            gate: None,
        }
    }

    pub fn fail(error: OperationError) -> Self {
        Step {
            delay: Duration::ZERO,
            result: Err(error),
            gate: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Wait on `gate` before the delay
    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }
}

/// Provider that plays back queued steps, then repeats a fallback
pub struct ScriptedOperation<V> {
    steps: Mutex<VecDeque<Step<V>>>,
    fallback: Step<V>,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl<V: Clone> ScriptedOperation<V> {
    pub fn new(fallback: Step<V>) -> Self {
        ScriptedOperation {
            steps: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Always succeed with `value` after `delay`
    pub fn succeeding(value: V, delay: Duration) -> Self {
        Self::new(Step::succeed(value).after(delay))
    }

    /// Always fail with `error` after `delay`
    pub fn failing(error: OperationError, delay: Duration) -> Self {
        Self::new(Step::fail(error).after(delay))
    }

    pub fn then(self, step: Step<V>) -> Self {
        self.steps.lock().push_back(step);
        self
    }

    pub fn push(&self, step: Step<V>) {
        self.steps.lock().push_back(step);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of runs observed in flight at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step<V> {
        self.steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl<V> Operation for ScriptedOperation<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Output = V;

    fn run(&self) -> OperationFuture<'_, V> {
        let step = self.next_step();
        self.calls.fetch_add(1, Ordering::SeqCst);

        Box::pin(async move {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            if let Some(gate) = &step.gate {
                gate.wait().await;
            }
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }

            self.active.fetch_sub(1, Ordering::SeqCst);
            step.result
        })
    }
}
