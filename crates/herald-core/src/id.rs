//! Identity types for managers and subscribers
//!
//! Subscriber identities embed the identity of the manager that issued
//! them, so a handle presented to the wrong manager is detectable.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Manager identity - unique within the process
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagerId(pub u64);

impl ManagerId {
    /// Allocate a fresh identity from the process-wide counter
    pub fn next() -> Self {
        ManagerId(NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Manager({})", self.0)
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscriber identity - opaque token issued on attach
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId {
    manager: ManagerId,
    seq: u64,
}

impl SubscriberId {
    #[inline]
    pub fn new(manager: ManagerId, seq: u64) -> Self {
        SubscriberId { manager, seq }
    }

    /// Manager that issued this identity
    #[inline]
    pub fn manager(self) -> ManagerId {
        self.manager
    }

    #[inline]
    pub fn seq(self) -> u64 {
        self.seq
    }

    /// Check whether this identity was issued by `manager`
    #[inline]
    pub fn belongs_to(self, manager: ManagerId) -> bool {
        self.manager == manager
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({}:{})", self.manager.0, self.seq)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.manager.0, self.seq)
    }
}
