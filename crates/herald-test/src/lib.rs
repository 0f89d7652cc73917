//! Herald Test Harness - scripted providers and concurrency checks
//!
//! This crate provides:
//! - Scripted operation providers with controllable delay and outcome
//! - Gates for holding runs open at a chosen point
//! - Outcome recorders with deadlines
//! - Randomized attach / trigger / detach interleavings
//! - End-to-end integration testing

pub mod scripted;
pub mod recorder;
pub mod interleaving;
pub mod integration;

pub use scripted::*;
pub use recorder::*;
pub use interleaving::*;
pub use integration::*;
