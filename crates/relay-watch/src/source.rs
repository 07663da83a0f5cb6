//! Remote file access abstraction

use async_trait::async_trait;
use relay_core::{Fingerprint, RelayError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait for reading a remote file (allows mocking in tests)
///
/// Expected absence is not an error: [`RemoteSource::fingerprint`] returns
/// `Ok(None)` for a missing file. Errors for which
/// [`RelayError::is_transport`] holds mean the session must be reopened.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fingerprint of the file's current bytes, `None` if it does not exist
    async fn fingerprint(&self, path: &str) -> Result<Option<Fingerprint>>;

    /// Full file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// (Re)open the session
    async fn connect(&mut self) -> Result<()>;

    /// Drop the session; a later `connect` opens a fresh one
    async fn close(&mut self);

    /// Human-readable description of the remote end, for logs
    fn endpoint(&self) -> String;
}

/// One scripted observation for [`MockSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockPoll {
    /// The file now holds these bytes
    Content(Vec<u8>),
    /// The file does not exist
    Missing,
    /// The file holds these bytes when fingerprinted but is gone by the
    /// time it is read
    Vanishing(Vec<u8>),
    /// The session drops during this poll
    Disconnect,
}

impl MockPoll {
    pub fn text(content: &str) -> Self {
        Self::Content(content.as_bytes().to_vec())
    }
}

#[derive(Debug)]
struct MockState {
    script: VecDeque<MockPoll>,
    current: Option<Vec<u8>>,
    vanish_on_read: bool,
    connected: bool,
    failing_connects: usize,
    connects: usize,
    closes: usize,
    reads: usize,
    fingerprints: usize,
}

/// Scripted remote source for testing
///
/// Each `fingerprint` call consumes the next [`MockPoll`]; once the script is
/// exhausted the last content stays in place. Clones share state, so a test
/// can keep a handle after moving the source into a watcher.
#[derive(Debug, Clone)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                current: None,
                vanish_on_read: false,
                connected: true,
                failing_connects: 0,
                connects: 0,
                closes: 0,
                reads: 0,
                fingerprints: 0,
            })),
        }
    }

    pub fn with_poll(self, poll: MockPoll) -> Self {
        self.push(poll);
        self
    }

    pub fn with_text(self, content: &str) -> Self {
        self.with_poll(MockPoll::text(content))
    }

    /// Make the next `n` reconnect attempts fail
    pub fn with_failing_connects(self, n: usize) -> Self {
        self.lock().failing_connects = n;
        self
    }

    pub fn push(&self, poll: MockPoll) {
        self.lock().script.push_back(poll);
    }

    /// Number of successful `connect` calls
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// Number of full-content reads
    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    pub fn fingerprint_calls(&self) -> usize {
        self.lock().fingerprints
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only happens after a test already panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RemoteSource for MockSource {
    async fn fingerprint(&self, _path: &str) -> Result<Option<Fingerprint>> {
        let mut state = self.lock();
        state.fingerprints += 1;
        if !state.connected {
            return Err(RelayError::Transport("mock session closed".to_string()));
        }

        match state.script.pop_front() {
            Some(MockPoll::Content(bytes)) => state.current = Some(bytes),
            Some(MockPoll::Missing) => state.current = None,
            Some(MockPoll::Vanishing(bytes)) => {
                state.current = Some(bytes);
                state.vanish_on_read = true;
            }
            Some(MockPoll::Disconnect) => {
                state.connected = false;
                return Err(RelayError::Transport("mock connection reset".to_string()));
            }
            None => {}
        }

        Ok(state.current.as_deref().map(Fingerprint::of))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let mut state = self.lock();
        if !state.connected {
            return Err(RelayError::Transport("mock session closed".to_string()));
        }
        state.reads += 1;
        if state.vanish_on_read {
            state.vanish_on_read = false;
            state.current = None;
        }
        state
            .current
            .clone()
            .ok_or_else(|| RelayError::Other(format!("No such file: {}", path)))
    }

    async fn connect(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(RelayError::Transport("mock connect refused".to_string()));
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.lock();
        state.connected = false;
        state.closes += 1;
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }
}
