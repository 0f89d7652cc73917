//! Subscription registry
//!
//! Maps subscriber identities to mailbox write ends. Every way a subscriber
//! can leave (explicit detach, dropping its subscription, manager teardown)
//! goes through [`SubscriptionRegistry::remove`] or
//! [`SubscriptionRegistry::drain`], and an entry can only be taken out once,
//! so termination runs exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use herald_core::{ManagerId, Outcome, SubscriberId};

use crate::mailbox::{Delivery, Mailbox};

/// Callback run once when a subscriber leaves the registry
pub type TerminationHook = Box<dyn FnOnce(SubscriberId, DetachReason) + Send + 'static>;

/// Why a subscriber left the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetachReason {
    /// `detach` was called with the subscriber's handle
    Detached,
    /// The subscription was dropped by its observer
    Dropped,
    /// The manager was torn down
    Shutdown,
}

pub(crate) struct Entry<V> {
    mailbox: Arc<Mailbox<V>>,
    hook: Option<TerminationHook>,
}

impl<V> Entry<V> {
    pub(crate) fn new(mailbox: Arc<Mailbox<V>>, hook: Option<TerminationHook>) -> Self {
        Entry { mailbox, hook }
    }

    /// Close the mailbox and run the hook. Consumes the entry.
    pub(crate) fn terminate(mut self, id: SubscriberId, reason: DetachReason) {
        self.mailbox.close();
        if let Some(hook) = self.hook.take() {
            hook(id, reason);
        }
    }
}

/// Counters from one broadcast
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct BroadcastReport {
    pub delivered: usize,
    pub coalesced: usize,
}

pub(crate) struct SubscriptionRegistry<V> {
    manager: ManagerId,
    entries: HashMap<SubscriberId, Entry<V>>,
    next_seq: u64,
}

impl<V> SubscriptionRegistry<V> {
    pub(crate) fn new(manager: ManagerId) -> Self {
        SubscriptionRegistry {
            manager,
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Allocate an identity without registering anything
    pub(crate) fn next_id(&mut self) -> SubscriberId {
        let id = SubscriberId::new(self.manager, self.next_seq);
        self.next_seq += 1;
        id
    }

    pub(crate) fn insert(&mut self, entry: Entry<V>) -> SubscriberId {
        let id = self.next_id();
        self.entries.insert(id, entry);
        id
    }

    /// Take an entry out; `None` if it was never here or already removed
    pub(crate) fn remove(&mut self, id: SubscriberId) -> Option<Entry<V>> {
        self.entries.remove(&id)
    }

    /// Take every entry out
    pub(crate) fn drain(&mut self) -> Vec<(SubscriberId, Entry<V>)> {
        self.entries.drain().collect()
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<V: Clone> SubscriptionRegistry<V> {
    /// Enqueue `outcome` to every registered mailbox
    pub(crate) fn broadcast(&self, outcome: &Outcome<V>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for entry in self.entries.values() {
            match entry.mailbox.push(outcome.clone()) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Coalesced => {
                    report.delivered += 1;
                    report.coalesced += 1;
                }
                Delivery::Closed => {}
            }
        }
        report
    }
}
