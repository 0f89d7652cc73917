//! Outcome of an asynchronous operation
//!
//! An [`Outcome`] is immutable once built. Managers replace their current
//! outcome wholesale; they never patch it in place.

use std::fmt;

use crate::OperationError;

/// Tagged outcome of an asynchronous operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<V> {
    /// Nothing has been attempted yet
    Idle,
    /// An operation is in flight
    Pending,
    Succeeded(V),
    Failed(OperationError),
}

/// Fieldless discriminant of [`Outcome`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

impl OutcomeKind {
    /// Check whether a manager may move from `prev` to `self`
    ///
    /// Idle only ever starts a manager's life; every settle is preceded by
    /// Pending, and every Pending follows a non-pending state.
    pub fn may_follow(self, prev: OutcomeKind) -> bool {
        match self {
            OutcomeKind::Idle => false,
            OutcomeKind::Pending => prev != OutcomeKind::Pending,
            OutcomeKind::Succeeded | OutcomeKind::Failed => prev == OutcomeKind::Pending,
        }
    }

    #[inline]
    pub fn is_settled(self) -> bool {
        matches!(self, OutcomeKind::Succeeded | OutcomeKind::Failed)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeKind::Idle => "idle",
            OutcomeKind::Pending => "pending",
            OutcomeKind::Succeeded => "succeeded",
            OutcomeKind::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl<V> Outcome<V> {
    pub fn from_result(result: Result<V, OperationError>) -> Self {
        match result {
            Ok(value) => Outcome::Succeeded(value),
            Err(error) => Outcome::Failed(error),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Idle => OutcomeKind::Idle,
            Outcome::Pending => OutcomeKind::Pending,
            Outcome::Succeeded(_) => OutcomeKind::Succeeded,
            Outcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self, Outcome::Idle)
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }

    #[inline]
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Succeeded or Failed
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.kind().is_settled()
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Outcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&OperationError> {
        match self {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(V) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Idle => Outcome::Idle,
            Outcome::Pending => Outcome::Pending,
            Outcome::Succeeded(value) => Outcome::Succeeded(f(value)),
            Outcome::Failed(error) => Outcome::Failed(error),
        }
    }
}

impl<V> Default for Outcome<V> {
    fn default() -> Self {
        Outcome::Idle
    }
}

impl<V> From<Result<V, OperationError>> for Outcome<V> {
    fn from(result: Result<V, OperationError>) -> Self {
        Outcome::from_result(result)
    }
}
