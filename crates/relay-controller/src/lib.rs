//! # relay-controller
//!
//! Robot dashboard integration for Relay.
//!
//! This crate provides:
//! - [`CommandChannel`], a one-command-in-flight request/response session,
//!   with a TCP implementation ([`DashboardSession`]) and a scripted mock
//! - The dashboard command vocabulary and response predicates
//! - [`ActionExecutor`], which runs actions one at a time through a pure
//!   per-action state machine (busy check, reset, load, play, wait)

mod channel;
mod executor;
mod protocol;

pub use channel::{CommandChannel, DashboardSession, MockChannel, MockReply};
pub use executor::{heartbeat, transition, ActionExecutor, Pause, Phase};
pub use protocol::{is_running, load_failed, play_failed, program_path, DashboardCommand};
