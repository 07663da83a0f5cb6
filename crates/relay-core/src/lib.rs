//! # relay-core
//!
//! Core types for the Relay pipeline.
//!
//! Relay watches a remote instruction file, asks a completion service to turn
//! each new instruction into a list of controller programs, and drives a robot
//! dashboard server through those programs one at a time.
//!
//! ## Shared pieces
//!
//! - [`RelayError`] is the single error taxonomy used by every crate
//! - [`RelayConfig`] is loaded once at startup and passed into constructors
//! - [`Action`], [`Fingerprint`], [`Instruction`] and [`ExecutionOutcome`]
//!   are the values that flow between the pipeline stages

mod config;
mod error;
pub mod fail_open;
mod types;

pub use config::{AgentConfig, ControllerConfig, OrchestratorConfig, RelayConfig, WatchConfig};
pub use error::{RelayError, Result};
pub use types::*;
