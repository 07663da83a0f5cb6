//! # relay-watch
//!
//! Remote file change detection for Relay.
//!
//! This crate provides:
//! - A [`RemoteSource`] abstraction over "fingerprint this path" and
//!   "read this path", with an SFTP implementation and a scripted mock
//! - [`ChangeWatcher`], which polls a source and emits a [`FileChange`] only
//!   when the content fingerprint moves, reconnecting on transport failures

mod sftp;
mod source;
mod watcher;

pub use sftp::SftpSource;
pub use source::{MockPoll, MockSource, RemoteSource};
pub use watcher::{ChangeWatcher, FileChange, WatchedResource};
