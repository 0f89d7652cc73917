//! Per-subscriber mailbox
//!
//! The broadcaster never waits on a subscriber: every push is a short
//! critical section on the mailbox lock. How a slow reader is treated is
//! decided by [`Backpressure`].

use std::collections::VecDeque;

use herald_core::{HeraldError, HeraldResult, Outcome};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default number of outcomes a coalescing mailbox holds
pub const DEFAULT_MAILBOX_CAPACITY: usize = 16;

/// What a mailbox does when its reader falls behind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backpressure {
    /// Queue every outcome; memory grows with the reader's lag
    Unbounded,
    /// Hold at most `capacity` outcomes. When full, the oldest Idle or
    /// Pending entry is evicted first; the oldest settled entry goes only
    /// when nothing else can. The newest outcome is always kept.
    Coalesce { capacity: usize },
}

impl Backpressure {
    pub fn coalesce(capacity: usize) -> HeraldResult<Self> {
        if capacity == 0 {
            return Err(HeraldError::ZeroMailboxCapacity);
        }
        Ok(Backpressure::Coalesce { capacity })
    }

    fn capacity(self) -> Option<usize> {
        match self {
            Backpressure::Unbounded => None,
            Backpressure::Coalesce { capacity } => Some(capacity.max(1)),
        }
    }
}

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::Coalesce {
            capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// Result of a push
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Queued after evicting an older entry
    Coalesced,
    Closed,
}

struct MailboxState<V> {
    queue: VecDeque<Outcome<V>>,
    closed: bool,
    dropped: u64,
}

/// Single-reader queue of outcomes
pub(crate) struct Mailbox<V> {
    state: Mutex<MailboxState<V>>,
    notify: Notify,
    policy: Backpressure,
}

impl<V> Mailbox<V> {
    pub(crate) fn new(policy: Backpressure) -> Self {
        Mailbox {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
            policy,
        }
    }

    /// Enqueue without blocking
    pub(crate) fn push(&self, outcome: Outcome<V>) -> Delivery {
        let mut state = self.state.lock();
        if state.closed {
            return Delivery::Closed;
        }

        let mut delivery = Delivery::Queued;
        if let Some(capacity) = self.policy.capacity() {
            if state.queue.len() >= capacity {
                let victim = state
                    .queue
                    .iter()
                    .position(|queued| !queued.is_settled())
                    .unwrap_or(0);
                state.queue.remove(victim);
                state.dropped += 1;
                delivery = Delivery::Coalesced;
            }
        }
        state.queue.push_back(outcome);
        drop(state);

        // Single reader: a stored permit covers a reader that is not yet waiting
        self.notify.notify_one();
        delivery
    }

    /// Stop accepting outcomes; queued ones remain readable
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }

    pub(crate) fn try_pop(&self) -> Option<Outcome<V>> {
        self.state.lock().queue.pop_front()
    }

    /// Wait for the next outcome; `None` once closed and drained
    pub(crate) async fn pop(&self) -> Option<Outcome<V>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(outcome) = state.queue.pop_front() {
                    return Some(outcome);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of outcomes evicted by coalescing
    pub(crate) fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}
