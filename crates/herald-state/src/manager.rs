//! State manager - single authority over one outcome and its fan-out
//!
//! Locking:
//! - `state` (parking_lot) guards the current outcome, the registry and the
//!   shutdown flag. Every assignment of the current outcome happens together
//!   with its broadcast inside one critical section, and attach/detach take
//!   the same lock, so all subscribers observe one total order.
//! - `trigger_lock` (tokio, FIFO) is held across a whole Pending -> settle
//!   span so triggers queue instead of interleaving.
//!
//! Each run is numbered. A run whose driver is dropped or unwinds before
//! settling is settled as `Failed(Cancelled)`, so Pending is never stranded.
//!
//! Nothing awaits while `state` is held; mailbox pushes never block.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use herald_core::{ManagerId, OperationError, Outcome, OutcomeKind, SubscriberId};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::mailbox::{Backpressure, Mailbox};
use crate::operation::Operation;
use crate::registry::{BroadcastReport, DetachReason, Entry, SubscriptionRegistry, TerminationHook};
use crate::subscription::Subscription;

struct ManagerState<V> {
    current: Outcome<V>,
    registry: SubscriptionRegistry<V>,
    shut_down: bool,
    /// Run that published the current Pending, if it has not settled
    running: Option<u64>,
    next_run: u64,
}

impl<V: Clone> ManagerState<V> {
    fn assign(&mut self, next: Outcome<V>) -> BroadcastReport {
        debug_assert!(
            next.kind().may_follow(self.current.kind()),
            "invalid transition {} -> {}",
            self.current.kind(),
            next.kind()
        );
        self.current = next;
        self.registry.broadcast(&self.current)
    }
}

/// State shared between manager clones, running triggers and subscriptions
pub(crate) struct Shared<V> {
    id: ManagerId,
    policy: Backpressure,
    state: Mutex<ManagerState<V>>,
}

impl<V> Shared<V> {
    fn new(policy: Backpressure) -> Self {
        let id = ManagerId::next();
        Shared {
            id,
            policy,
            state: Mutex::new(ManagerState {
                current: Outcome::Idle,
                registry: SubscriptionRegistry::new(id),
                shut_down: false,
                running: None,
                next_run: 0,
            }),
        }
    }

    /// Single removal path for detach, drop and teardown of one subscriber
    pub(crate) fn remove(&self, id: SubscriberId, reason: DetachReason) -> bool {
        let entry = self.state.lock().registry.remove(id);
        match entry {
            Some(entry) => {
                entry.terminate(id, reason);
                debug!(manager = %self.id, subscriber = %id, ?reason, "subscriber detached");
                true
            }
            None => {
                trace!(manager = %self.id, subscriber = %id, "detach of absent subscriber ignored");
                false
            }
        }
    }

    fn shutdown(&self) -> usize {
        let entries = {
            let mut state = self.state.lock();
            if state.shut_down {
                return 0;
            }
            state.shut_down = true;
            state.registry.drain()
        };
        let count = entries.len();
        for (id, entry) in entries {
            entry.terminate(id, DetachReason::Shutdown);
        }
        count
    }
}

impl<V: Clone> Shared<V> {
    /// Publish Pending for a new run and return its number
    ///
    /// A Pending left behind by a run whose driver never finished is first
    /// settled as `Failed(Cancelled)`.
    fn begin_run(&self) -> u64 {
        let mut state = self.state.lock();
        if let Some(stale) = state.running.take() {
            let report = state.assign(Outcome::Failed(OperationError::Cancelled));
            warn!(manager = %self.id, run = stale, "settling abandoned run as cancelled");
            self.log_publish(OutcomeKind::Failed, report);
        }
        state.next_run += 1;
        let run = state.next_run;
        state.running = Some(run);
        let report = state.assign(Outcome::Pending);
        drop(state);

        self.log_publish(OutcomeKind::Pending, report);
        run
    }

    /// Settle `run`; false if it is no longer the run in flight
    fn finish_run(&self, run: u64, settled: Outcome<V>) -> bool {
        let mut state = self.state.lock();
        if state.running != Some(run) {
            return false;
        }
        state.running = None;
        let kind = settled.kind();
        let report = state.assign(settled);
        drop(state);

        self.log_publish(kind, report);
        true
    }

    fn log_publish(&self, kind: OutcomeKind, report: BroadcastReport) {
        debug!(
            manager = %self.id,
            outcome = %kind,
            delivered = report.delivered,
            "outcome published"
        );
        if report.coalesced > 0 {
            warn!(
                manager = %self.id,
                coalesced = report.coalesced,
                "slow subscribers: older outcomes evicted"
            );
        }
    }
}

/// Settles its run as `Failed(Cancelled)` unless disarmed
///
/// Covers a driver task that is dropped (runtime shutdown) or unwinds
/// between Pending and the settle.
struct RunGuard<V: Clone> {
    shared: Arc<Shared<V>>,
    run: u64,
    armed: bool,
}

impl<V: Clone> Drop for RunGuard<V> {
    fn drop(&mut self) {
        if self.armed
            && self
                .shared
                .finish_run(self.run, Outcome::Failed(OperationError::Cancelled))
        {
            warn!(manager = %self.shared.id, run = self.run, "run abandoned before settling");
        }
    }
}

impl<V> Drop for Shared<V> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        let entries = state.registry.drain();
        if !entries.is_empty() {
            debug!(manager = %self.id, subscribers = entries.len(), "manager dropped, closing subscribers");
        }
        for (id, entry) in entries {
            entry.terminate(id, DetachReason::Shutdown);
        }
    }
}

/// Exclusive owner of one [`Outcome`] and its subscribers
///
/// Cloning is cheap and every clone refers to the same manager. The manager
/// is torn down by [`StateManager::shutdown`] or when the last clone (and
/// any trigger still running) is gone.
pub struct StateManager<V> {
    shared: Arc<Shared<V>>,
    provider: Arc<dyn Operation<Output = V>>,
    trigger_lock: Arc<tokio::sync::Mutex<()>>,
}

impl<V> StateManager<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a manager bound to `provider`, starting Idle
    pub fn new<P>(provider: P) -> Self
    where
        P: Operation<Output = V>,
    {
        Self::with_backpressure(provider, Backpressure::default())
    }

    pub fn with_backpressure<P>(provider: P, policy: Backpressure) -> Self
    where
        P: Operation<Output = V>,
    {
        Self::from_arc(Arc::new(provider), policy)
    }

    pub fn from_arc(provider: Arc<dyn Operation<Output = V>>, policy: Backpressure) -> Self {
        let shared = Arc::new(Shared::new(policy));
        debug!(manager = %shared.id, ?policy, "manager created");
        StateManager {
            shared,
            provider,
            trigger_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn id(&self) -> ManagerId {
        self.shared.id
    }

    pub fn backpressure(&self) -> Backpressure {
        self.shared.policy
    }

    /// Snapshot of the current outcome
    pub fn current(&self) -> Outcome<V> {
        self.shared.state.lock().current.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    pub fn is_attached(&self, id: SubscriberId) -> bool {
        self.shared.state.lock().registry.contains(id)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// Register a new subscriber
    ///
    /// The current outcome is queued before this returns, so the first
    /// `recv` never waits. After teardown the subscription carries only that
    /// snapshot and is already closed.
    pub fn attach(&self) -> Subscription<V> {
        self.attach_inner(None)
    }

    /// Like [`attach`](Self::attach), running `hook` once when the
    /// subscriber leaves for any reason
    pub fn attach_with_hook<H>(&self, hook: H) -> Subscription<V>
    where
        H: FnOnce(SubscriberId, DetachReason) + Send + 'static,
    {
        self.attach_inner(Some(Box::new(hook)))
    }

    fn attach_inner(&self, hook: Option<TerminationHook>) -> Subscription<V> {
        let mailbox = Arc::new(Mailbox::new(self.shared.policy));

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        mailbox.push(state.current.clone());

        if state.shut_down {
            let id = state.registry.next_id();
            drop(guard);
            mailbox.close();
            warn!(manager = %self.shared.id, subscriber = %id, "attach after shutdown");
            Entry::new(Arc::clone(&mailbox), hook).terminate(id, DetachReason::Shutdown);
            return Subscription::new(id, mailbox, Arc::downgrade(&self.shared));
        }

        let id = state.registry.insert(Entry::new(Arc::clone(&mailbox), hook));
        let count = state.registry.len();
        drop(guard);

        debug!(manager = %self.shared.id, subscriber = %id, subscribers = count, "subscriber attached");
        Subscription::new(id, mailbox, Arc::downgrade(&self.shared))
    }

    /// Remove a subscriber and close its stream
    ///
    /// Returns whether anything was removed. Unknown, foreign and
    /// already-removed handles are a no-op.
    pub fn detach(&self, id: SubscriberId) -> bool {
        if !id.belongs_to(self.shared.id) {
            warn!(manager = %self.shared.id, subscriber = %id, "detach with a foreign handle ignored");
            return false;
        }
        self.shared.remove(id, DetachReason::Detached)
    }

    /// Run the bound provider: broadcast Pending, then its settled outcome
    ///
    /// Calls queue behind any trigger in flight. Once started, a run
    /// completes even if the returned future is dropped.
    pub async fn trigger(&self) -> Outcome<V> {
        let provider = Arc::clone(&self.provider);
        self.run(async move { provider.run().await }).await
    }

    /// Run an ad-hoc operation through the same Pending -> settle path
    ///
    /// Used for provider methods other than the bound one.
    pub async fn trigger_with<F>(&self, operation: F) -> Outcome<V>
    where
        F: Future<Output = Result<V, OperationError>> + Send + 'static,
    {
        self.run(operation).await
    }

    async fn run<F>(&self, operation: F) -> Outcome<V>
    where
        F: Future<Output = Result<V, OperationError>> + Send + 'static,
    {
        let permit = Arc::clone(&self.trigger_lock).lock_owned().await;
        if self.is_shut_down() {
            warn!(manager = %self.shared.id, "trigger after shutdown ignored");
            return self.current();
        }

        let shared = Arc::clone(&self.shared);
        let driver = tokio::spawn(async move {
            let _permit = permit;
            let run = shared.begin_run();
            let mut guard = RunGuard {
                shared: Arc::clone(&shared),
                run,
                armed: true,
            };

            let settled = match tokio::spawn(operation).await {
                Ok(result) => Outcome::from_result(result),
                Err(err) if err.is_panic() => {
                    let message = panic_message(err.into_panic());
                    warn!(manager = %shared.id, %message, "operation panicked");
                    Outcome::Failed(OperationError::Panicked(message))
                }
                Err(_) => Outcome::Failed(OperationError::Cancelled),
            };
            shared.finish_run(run, settled.clone());
            guard.armed = false;
            settled
        });

        match driver.await {
            Ok(settled) => settled,
            // Driver dropped by runtime shutdown, or it unwound; its guard
            // has already published the same outcome
            Err(err) => {
                warn!(manager = %self.shared.id, error = %err, "trigger driver ended early");
                Outcome::Failed(OperationError::Cancelled)
            }
        }
    }

    /// Tear down: close every subscriber stream
    ///
    /// Later `attach` calls get a closed snapshot; later triggers run nothing.
    pub fn shutdown(&self) {
        let closed = self.shared.shutdown();
        debug!(manager = %self.shared.id, subscribers = closed, "manager shut down");
    }
}

impl<V> Clone for StateManager<V> {
    fn clone(&self) -> Self {
        StateManager {
            shared: Arc::clone(&self.shared),
            provider: Arc::clone(&self.provider),
            trigger_lock: Arc::clone(&self.trigger_lock),
        }
    }
}

impl<V> fmt::Debug for StateManager<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("StateManager")
            .field("id", &self.shared.id)
            .field("current", &state.current.kind())
            .field("subscribers", &state.registry.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::from_fn;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn hello() -> StateManager<String> {
        StateManager::new(from_fn(|| async {
            Ok::<_, OperationError>("hello".to_string())
        }))
    }

    fn drain<V>(sub: &mut Subscription<V>) -> Vec<Outcome<V>> {
        std::iter::from_fn(|| sub.try_recv()).collect()
    }

    #[tokio::test]
    async fn test_attach_delivers_current_first() {
        let manager = hello();
        let mut sub = manager.attach();

        assert_eq!(sub.try_recv(), Some(Outcome::Idle));
        assert_eq!(sub.try_recv(), None);
        assert_eq!(manager.subscriber_count(), 1);
        assert!(manager.is_attached(sub.id()));
    }

    #[tokio::test]
    async fn test_trigger_success_sequence() {
        let manager = hello();
        let mut sub = manager.attach();

        let settled = manager.trigger().await;
        assert_eq!(settled, Outcome::Succeeded("hello".to_string()));
        assert_eq!(manager.current(), settled);

        assert_eq!(sub.recv().await, Some(Outcome::Idle));
        assert_eq!(sub.recv().await, Some(Outcome::Pending));
        assert_eq!(sub.recv().await, Some(Outcome::Succeeded("hello".to_string())));
    }

    #[tokio::test]
    async fn test_trigger_failure_sequence() {
        let manager = StateManager::new(from_fn(|| async {
            Err::<String, _>(OperationError::failed("backend unavailable"))
        }));
        let mut sub = manager.attach();

        manager.trigger().await;

        assert_eq!(
            drain(&mut sub),
            vec![
                Outcome::Idle,
                Outcome::Pending,
                Outcome::Failed(OperationError::failed("backend unavailable")),
            ]
        );
    }

    #[tokio::test]
    async fn test_late_attach_sees_only_current() {
        let manager = hello();
        manager.trigger().await;

        let mut sub = manager.attach();
        assert_eq!(drain(&mut sub), vec![Outcome::Succeeded("hello".to_string())]);
    }

    #[tokio::test]
    async fn test_detach_is_idempotent() {
        let manager = hello();
        let mut sub = manager.attach();
        let id = sub.id();

        assert!(manager.detach(id));
        assert!(!manager.detach(id));
        assert_eq!(manager.subscriber_count(), 0);

        manager.trigger().await;

        assert_eq!(sub.recv().await, Some(Outcome::Idle));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_foreign_handle_is_ignored() {
        let a = hello();
        let b = hello();
        let sub = a.attach();

        assert!(!b.detach(sub.id()));
        assert_eq!(a.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let manager = hello();
        let sub = {
            let calls = Arc::clone(&calls);
            manager.attach_with_hook(move |_, reason| {
                assert_eq!(reason, DetachReason::Detached);
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(manager.detach(sub.id()));
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let reasons = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let manager = hello();
        let sub = {
            let reasons = Arc::clone(&reasons);
            manager.attach_with_hook(move |_, reason| reasons.lock().push(reason))
        };

        drop(sub);
        assert_eq!(manager.subscriber_count(), 0);
        assert_eq!(*reasons.lock(), vec![DetachReason::Dropped]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_ignores_later_calls() {
        let runs = Arc::new(AtomicUsize::new(0));
        let manager = {
            let runs = Arc::clone(&runs);
            StateManager::new(from_fn(move || {
                runs.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, OperationError>(1u32) }
            }))
        };
        let mut sub = manager.attach();

        manager.shutdown();
        assert!(manager.is_shut_down());
        assert_eq!(sub.recv().await, Some(Outcome::Idle));
        assert_eq!(sub.recv().await, None);

        let mut late = manager.attach();
        assert!(late.is_closed());
        assert_eq!(late.recv().await, Some(Outcome::Idle));
        assert_eq!(late.recv().await, None);

        assert_eq!(manager.trigger().await, Outcome::Idle);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hooks_see_shutdown_reason() {
        let reasons = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let record = |reasons: &Arc<parking_lot::Mutex<Vec<DetachReason>>>| {
            let reasons = Arc::clone(reasons);
            move |_: SubscriberId, reason: DetachReason| reasons.lock().push(reason)
        };
        let manager = hello();
        let _live = manager.attach_with_hook(record(&reasons));

        manager.shutdown();
        assert_eq!(*reasons.lock(), vec![DetachReason::Shutdown]);

        let late = manager.attach_with_hook(record(&reasons));
        assert!(late.is_closed());
        assert_eq!(
            *reasons.lock(),
            vec![DetachReason::Shutdown, DetachReason::Shutdown]
        );

        drop(late);
        assert_eq!(reasons.lock().len(), 2);
    }

    #[test]
    fn test_run_dropped_with_runtime_settles_cancelled() {
        let manager = StateManager::with_backpressure(
            from_fn(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, OperationError>(1u32)
            }),
            Backpressure::Unbounded,
        );
        let mut sub = manager.attach();

        let first = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        first.spawn({
            let manager = manager.clone();
            async move { manager.trigger().await }
        });
        first.block_on(async {
            while !manager.current().is_pending() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
        drop(first);

        assert_eq!(manager.current(), Outcome::Failed(OperationError::Cancelled));

        let second = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        assert_eq!(second.block_on(manager.trigger()), Outcome::Succeeded(1));
        assert_eq!(manager.current(), Outcome::Succeeded(1));
        assert_eq!(
            drain(&mut sub),
            vec![
                Outcome::Idle,
                Outcome::Pending,
                Outcome::Failed(OperationError::Cancelled),
                Outcome::Pending,
                Outcome::Succeeded(1),
            ]
        );
    }

    #[tokio::test]
    async fn test_dropping_manager_closes_subscribers() {
        let manager = hello();
        let mut sub = manager.attach();
        drop(manager);

        assert_eq!(sub.recv().await, Some(Outcome::Idle));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_panicking_operation_settles_failed() {
        let manager = StateManager::new(from_fn(|| async {
            if true {
                panic!("kaboom");
            }
            Ok::<u32, OperationError>(0)
        }));

        assert_eq!(
            manager.trigger().await,
            Outcome::Failed(OperationError::Panicked("kaboom".to_string()))
        );
    }

    #[tokio::test]
    async fn test_triggers_are_serialized() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));
        let op = {
            let in_flight = Arc::clone(&in_flight);
            let overlapped = Arc::clone(&overlapped);
            from_fn(move || {
                let in_flight = Arc::clone(&in_flight);
                let overlapped = Arc::clone(&overlapped);
                async move {
                    if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlapped.store(true, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, OperationError>(1u32)
                }
            })
        };
        let manager = StateManager::with_backpressure(op, Backpressure::Unbounded);
        let mut sub = manager.attach();

        let a = tokio::spawn({
            let manager = manager.clone();
            async move { manager.trigger().await }
        });
        let b = tokio::spawn({
            let manager = manager.clone();
            async move { manager.trigger().await }
        });
        a.await.unwrap();
        b.await.unwrap();

        assert!(!overlapped.load(Ordering::SeqCst));
        let kinds: Vec<OutcomeKind> = drain(&mut sub).iter().map(Outcome::kind).collect();
        assert_eq!(
            kinds,
            vec![
                OutcomeKind::Idle,
                OutcomeKind::Pending,
                OutcomeKind::Succeeded,
                OutcomeKind::Pending,
                OutcomeKind::Succeeded,
            ]
        );
    }

    #[tokio::test]
    async fn test_run_completes_after_caller_gives_up() {
        let gate = Arc::new(Notify::new());
        let manager = {
            let gate = Arc::clone(&gate);
            StateManager::new(from_fn(move || {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok::<_, OperationError>(3u32)
                }
            }))
        };
        let mut sub = manager.attach();

        let gave_up = tokio::time::timeout(Duration::from_millis(20), manager.trigger()).await;
        assert!(gave_up.is_err());
        assert!(manager.current().is_pending());

        gate.notify_one();
        assert_eq!(sub.recv().await, Some(Outcome::Idle));
        assert_eq!(sub.recv().await, Some(Outcome::Pending));
        assert_eq!(sub.recv().await, Some(Outcome::Succeeded(3)));
    }
}
