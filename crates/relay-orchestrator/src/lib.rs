//! # relay-orchestrator
//!
//! The Relay pipeline loop.
//!
//! One [`Orchestrator`] owns a change watcher, a completion agent and an
//! action executor, and alternates between them strictly: wait for a change,
//! turn it into actions, run the actions, wait again. Nothing overlaps.

mod pipeline;

pub use pipeline::{ChangeOutcome, Orchestrator};
