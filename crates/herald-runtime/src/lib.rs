//! Herald Runtime - everything around the state manager
//!
//! This crate wires state managers into an application:
//! - Runtime configuration (JSON + environment overrides)
//! - Logging bootstrap
//! - Operation adapters (timeout, cancellation)
//! - Observer tasks and presentation view models
//! - Feature domains (authentication, string fetch)
//! - Process-wide service holder

pub mod config;
pub mod logging;
pub mod adapters;
pub mod observer;
pub mod view;
pub mod auth;
pub mod strings;
pub mod services;

pub use config::*;
pub use logging::*;
pub use adapters::*;
pub use observer::*;
pub use view::*;
pub use auth::*;
pub use strings::*;
pub use services::*;
