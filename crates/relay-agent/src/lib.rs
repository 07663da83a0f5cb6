//! # relay-agent
//!
//! Streaming completion client for Relay.
//!
//! The agent sends `system prompt + instruction` to a generate endpoint that
//! answers with newline-delimited JSON events, stitches the streamed fragments
//! back together and extracts an ordered list of [`relay_core::Action`]s.
//!
//! ## Key Pattern
//!
//! Failures are soft. A transport error or an unparseable answer is retried a
//! bounded number of times; after that the agent returns an empty list, which
//! the pipeline reads as "nothing to execute".

mod client;
mod response;
mod stream;
mod types;

pub use client::CompletionAgent;
pub use response::{extract_actions, strip_code_fence};
pub use stream::{collect_text, NdjsonStreamParser, StreamAccumulator};
pub use types::{GenerateEvent, GenerateRequest};
