//! Observer-side read end of a manager

use std::fmt;
use std::sync::{Arc, Weak};

use herald_core::{Outcome, SubscriberId};

use crate::mailbox::Mailbox;
use crate::manager::Shared;
use crate::registry::DetachReason;

/// Ordered stream of outcomes from one manager
///
/// The first outcome is the manager's current outcome at attach time.
/// Dropping the subscription detaches it.
pub struct Subscription<V> {
    id: SubscriberId,
    mailbox: Arc<Mailbox<V>>,
    manager: Weak<Shared<V>>,
    detached: bool,
}

impl<V> Subscription<V> {
    pub(crate) fn new(id: SubscriberId, mailbox: Arc<Mailbox<V>>, manager: Weak<Shared<V>>) -> Self {
        Subscription {
            id,
            mailbox,
            manager,
            detached: false,
        }
    }

    /// Handle to pass to `StateManager::detach`
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next outcome, or `None` once detached or torn down and drained
    pub async fn recv(&mut self) -> Option<Outcome<V>> {
        self.mailbox.pop().await
    }

    /// Next queued outcome without waiting
    pub fn try_recv(&mut self) -> Option<Outcome<V>> {
        self.mailbox.try_pop()
    }

    /// Outcomes waiting to be read
    pub fn queued(&self) -> usize {
        self.mailbox.len()
    }

    /// Outcomes evicted because this reader fell behind
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped()
    }

    /// True once the manager stopped delivering to this subscription
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }

    /// Detach explicitly. Same effect as dropping.
    pub fn detach(mut self) {
        self.leave(DetachReason::Detached);
    }

    fn leave(&mut self, reason: DetachReason) {
        if self.detached {
            return;
        }
        self.detached = true;
        if let Some(shared) = self.manager.upgrade() {
            shared.remove(self.id, reason);
        }
    }
}

impl<V> Drop for Subscription<V> {
    fn drop(&mut self) {
        self.leave(DetachReason::Dropped);
    }
}

impl<V> fmt::Debug for Subscription<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("queued", &self.queued())
            .field("closed", &self.is_closed())
            .finish()
    }
}
