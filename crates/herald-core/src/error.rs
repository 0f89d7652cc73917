//! Error types for Herald
//!
//! Two families live here. [`OperationError`] is data: it is what a failed
//! operation settles into and is broadcast to observers like any other
//! outcome. [`HeraldError`] covers faults outside that data model, such as
//! bad configuration or bootstrapping the process twice.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Why an operation did not produce a value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// The operation was interrupted before completion
    #[error("operation cancelled")]
    Cancelled,

    #[error("operation failed: {cause}")]
    Failed { cause: String },

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// The operation panicked; the panic was contained by the manager
    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    pub fn failed(cause: impl fmt::Display) -> Self {
        OperationError::Failed {
            cause: cause.to_string(),
        }
    }

    /// Capture an arbitrary error, flattening its `source()` chain
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut cause = err.to_string();
        let mut source = err.source();
        while let Some(inner) = source {
            cause.push_str(": ");
            cause.push_str(&inner.to_string());
            source = inner.source();
        }
        OperationError::Failed { cause }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationError::Cancelled)
    }
}

impl From<std::io::Error> for OperationError {
    fn from(err: std::io::Error) -> Self {
        OperationError::from_error(&err)
    }
}

/// Faults outside the outcome data model
#[derive(Error, Debug)]
pub enum HeraldError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Mailbox capacity must be > 0")]
    ZeroMailboxCapacity,

    #[error("Logging initialisation failed: {0}")]
    Logging(String),

    #[error("Services already installed")]
    AlreadyInstalled,

    #[error("Services not installed")]
    NotInstalled,
}

/// Result type for Herald faults
pub type HeraldResult<T> = Result<T, HeraldError>;
