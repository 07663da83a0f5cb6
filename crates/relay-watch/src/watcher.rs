//! Remote file watcher for detecting content changes
//!
//! Polls a [`RemoteSource`] on a fixed interval and emits a [`FileChange`]
//! only when the content fingerprint differs from the last one seen. The
//! watcher is pull-based: the caller asks for the next change, and no polling
//! happens while the caller is busy with the previous one.

use chrono::{DateTime, Utc};
use relay_core::{Fingerprint, RelayError, Result, WatchConfig};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::source::RemoteSource;

/// A change emitted by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub content: String,
    pub fingerprint: Fingerprint,
    pub observed_at: DateTime<Utc>,
}

/// The watched path and what was last observed there
#[derive(Debug, Clone, Default)]
pub struct WatchedResource {
    pub path: String,
    pub fingerprint: Option<Fingerprint>,
    pub content: Option<String>,
}

impl WatchedResource {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fingerprint: None,
            content: None,
        }
    }
}

/// Watches one remote file for content changes
///
/// A watcher starts with no fingerprint, so the first poll that finds the file
/// emits it. Dropping the watcher closes nothing on its own; call
/// [`ChangeWatcher::close`] to end the session explicitly.
pub struct ChangeWatcher<S: RemoteSource> {
    source: S,
    resource: WatchedResource,
    poll_interval: Duration,
    reconnect_backoff: Duration,
    polled: bool,
}

impl<S: RemoteSource> ChangeWatcher<S> {
    /// Create a watcher over an already-connected source
    pub fn new(source: S, config: &WatchConfig) -> Self {
        Self {
            source,
            resource: WatchedResource::new(config.remote_path.clone()),
            poll_interval: config.poll_interval(),
            reconnect_backoff: config.reconnect_backoff(),
            polled: false,
        }
    }

    pub fn with_intervals(mut self, poll_interval: Duration, reconnect_backoff: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.reconnect_backoff = reconnect_backoff;
        self
    }

    pub fn resource(&self) -> &WatchedResource {
        &self.resource
    }

    pub fn endpoint(&self) -> String {
        self.source.endpoint()
    }

    /// Poll once: `Ok(Some(_))` when the content changed since the last poll
    ///
    /// A missing file is not a change and not an error. The fingerprint is
    /// recorded once the read succeeds but before decoding: a failed read is
    /// retried on the next tick, while a file that is not valid UTF-8 is
    /// reported once rather than on every tick.
    pub async fn poll_once(&mut self) -> Result<Option<FileChange>> {
        let path = self.resource.path.clone();

        let Some(fingerprint) = self.source.fingerprint(&path).await? else {
            debug!("{} does not exist yet", path);
            return Ok(None);
        };

        if self.resource.fingerprint.as_ref() == Some(&fingerprint) {
            return Ok(None);
        }

        debug!("Fingerprint of {} moved to {}", path, fingerprint.short());
        let bytes = self.source.read(&path).await?;
        self.resource.fingerprint = Some(fingerprint.clone());

        let content = String::from_utf8(bytes)
            .map_err(|e| RelayError::Decode(format!("{}: {}", path, e)))?;
        self.resource.content = Some(content.clone());

        Ok(Some(FileChange {
            path,
            content,
            fingerprint,
            observed_at: Utc::now(),
        }))
    }

    /// Wait for the next content change
    ///
    /// Never returns an error and never gives up: transport failures trigger
    /// a reconnect, anything else is logged and polling continues. The poll
    /// interval is slept between ticks, measured from the end of the previous
    /// tick (including whatever the caller did with the last change).
    pub async fn next_change(&mut self) -> FileChange {
        loop {
            if self.polled {
                tokio::time::sleep(self.poll_interval).await;
            }
            self.polled = true;

            match self.poll_once().await {
                Ok(Some(change)) => {
                    info!(
                        "File changed: {} ({})",
                        change.path,
                        change.fingerprint.short()
                    );
                    return change;
                }
                Ok(None) => {}
                Err(e) if e.is_transport() => {
                    warn!("Lost connection while watching {}: {}", self.resource.path, e);
                    self.reconnect().await;
                }
                Err(e) => {
                    error!("Error watching {}: {}", self.resource.path, e);
                }
            }
        }
    }

    /// Close the stale session and open a fresh one, retrying forever
    ///
    /// The fingerprint is reset, so the next poll reports the file as changed
    /// if it exists.
    pub async fn reconnect(&mut self) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            self.source.close().await;
            tokio::time::sleep(self.reconnect_backoff).await;

            match self.source.connect().await {
                Ok(()) => {
                    info!(
                        "Reconnected to {} after {} attempt(s)",
                        self.source.endpoint(),
                        attempt
                    );
                    self.resource.fingerprint = None;
                    return;
                }
                Err(e) => {
                    warn!(
                        "Reconnect attempt {} to {} failed: {}",
                        attempt,
                        self.source.endpoint(),
                        e
                    );
                }
            }
        }
    }

    /// End the watch session
    pub async fn close(mut self) {
        self.source.close().await;
    }
}
