//! Herald Core - Fundamental types
//!
//! This crate defines the types shared by every state manager:
//! - Outcomes of asynchronous operations (Idle, Pending, Succeeded, Failed)
//! - Operation errors, carried as data rather than raised
//! - Manager and subscriber identities
//! - Crate-level faults for configuration and bootstrap

pub mod id;
pub mod outcome;
pub mod error;

pub use id::*;
pub use outcome::*;
pub use error::*;
