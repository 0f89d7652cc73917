//! Observers and their consuming tasks
//!
//! An observer applies outcomes to presentation state. It runs on its own
//! task, detaches itself when stopped, and never touches manager state.

use herald_core::{Outcome, SubscriberId};
use herald_state::StateManager;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Receives the ordered outcomes of one manager
pub trait Observer<V>: Send + 'static {
    fn on_outcome(&mut self, outcome: &Outcome<V>);

    /// Called once after the last outcome
    fn on_close(&mut self) {}
}

/// Observer built from a closure, see [`observer_fn`]
pub struct FnObserver<F>(F);

pub fn observer_fn<V, F>(f: F) -> FnObserver<F>
where
    F: FnMut(&Outcome<V>) + Send + 'static,
{
    FnObserver(f)
}

impl<V, F> Observer<V> for FnObserver<F>
where
    F: FnMut(&Outcome<V>) + Send + 'static,
{
    fn on_outcome(&mut self, outcome: &Outcome<V>) {
        (self.0)(outcome)
    }
}

/// Handle to a running observer loop
///
/// Dropping the handle aborts the loop; its subscription is detached as the
/// task unwinds.
pub struct ObserverTask<O> {
    id: SubscriberId,
    stop: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<O>>,
}

/// Attach `observer` to `manager` and drive it on a new task
pub fn spawn_observer<V, O>(manager: &StateManager<V>, observer: O) -> ObserverTask<O>
where
    V: Clone + Send + Sync + 'static,
    O: Observer<V>,
{
    let mut subscription = manager.attach();
    let id = subscription.id();
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join = tokio::spawn(async move {
        let mut observer = observer;
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                next = subscription.recv() => match next {
                    Some(outcome) => observer.on_outcome(&outcome),
                    None => break,
                },
            }
        }
        subscription.detach();
        observer.on_close();
        debug!(subscriber = %id, "observer loop finished");
        observer
    });

    ObserverTask {
        id,
        stop: Some(stop_tx),
        join: Some(join),
    }
}

impl<O> ObserverTask<O> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the loop, detach, and hand the observer back
    pub async fn shutdown(mut self) -> Option<O> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.join.take()?.await.ok()
    }

    /// Wait for the loop to end on its own (manager teardown)
    pub async fn join(mut self) -> Option<O> {
        // Keep the stop sender alive: dropping it would end the loop
        let _stop = self.stop.take();
        self.join.take()?.await.ok()
    }
}

impl<O> Drop for ObserverTask<O> {
    fn drop(&mut self) {
        if let Some(join) = &self.join {
            join.abort();
        }
    }
}
