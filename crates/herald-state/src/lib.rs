//! Herald State Engine - single-owner state with fan-out
//!
//! This crate implements the state manager:
//! - Operation providers (the asynchronous work a manager runs)
//! - Per-subscriber mailboxes with a backpressure policy
//! - Subscription registry and detach lifecycle
//! - Serialized trigger / broadcast

pub mod operation;
pub mod mailbox;
pub mod registry;
pub mod subscription;
pub mod manager;

pub use operation::*;
pub use mailbox::{Backpressure, DEFAULT_MAILBOX_CAPACITY};
pub use registry::{DetachReason, TerminationHook};
pub use subscription::*;
pub use manager::*;
