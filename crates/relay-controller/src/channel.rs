//! Dashboard command channel abstraction

use async_trait::async_trait;
use relay_core::{ControllerConfig, RelayError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Request/response session with the controller (allows mocking in tests)
///
/// Exactly one command is in flight at a time; `&mut self` enforces it.
#[async_trait]
pub trait CommandChannel: Send {
    /// Send one command line and return the decoded reply
    async fn send(&mut self, command: &str) -> Result<String>;

    /// Human-readable description of the remote end, for logs
    fn endpoint(&self) -> String;
}

/// TCP session with a robot dashboard server
///
/// The greeting line the server sends on connect is consumed before the
/// first command. After a transport failure the socket is dropped and the
/// next `send` opens a fresh session.
pub struct DashboardSession {
    config: ControllerConfig,
    stream: Option<TcpStream>,
    greeting: Option<String>,
}

impl DashboardSession {
    /// Create a session that connects on the first `send`
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            stream: None,
            greeting: None,
        }
    }

    /// Open a session and consume the greeting
    pub async fn connect(config: ControllerConfig) -> Result<Self> {
        let mut session = Self::new(config);
        session.open().await?;
        Ok(session)
    }

    /// Greeting line received on the most recent connect
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    async fn open(&mut self) -> Result<()> {
        let address = self.config.address();
        let mut stream = timeout(self.config.connect_timeout(), TcpStream::connect(&address))
            .await
            .map_err(|_| RelayError::Transport(format!("Timed out connecting to {}", address)))?
            .map_err(|e| RelayError::Transport(format!("Failed to connect to {}: {}", address, e)))?;

        let greeting = self.read_greeting(&mut stream).await?;
        info!("Connected to controller {}: {}", address, greeting);

        self.greeting = Some(greeting);
        self.stream = Some(stream);
        Ok(())
    }

    /// Read until the first newline (or until the buffer limit)
    async fn read_greeting(&self, stream: &mut TcpStream) -> Result<String> {
        let mut greeting = Vec::new();
        let mut buffer = vec![0_u8; self.config.read_buffer];

        while !greeting.contains(&b'\n') && greeting.len() < self.config.read_buffer {
            let n = timeout(self.config.read_timeout(), stream.read(&mut buffer))
                .await
                .map_err(|_| {
                    RelayError::Transport("Timed out waiting for controller greeting".to_string())
                })??;
            if n == 0 {
                return Err(RelayError::Transport(
                    "Controller closed the connection before greeting".to_string(),
                ));
            }
            greeting.extend_from_slice(&buffer[..n]);
        }

        Ok(String::from_utf8_lossy(&greeting).trim().to_string())
    }

    async fn exchange(&mut self, command: &str) -> Result<String> {
        let settle = self.config.settle();
        let read_timeout = self.config.read_timeout();
        let mut buffer = vec![0_u8; self.config.read_buffer];

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RelayError::Transport("Controller session is not open".to_string()))?;

        stream.write_all(format!("{}\n", command).as_bytes()).await?;
        tokio::time::sleep(settle).await;

        let n = timeout(read_timeout, stream.read(&mut buffer))
            .await
            .map_err(|_| {
                RelayError::Transport(format!("Timed out waiting for reply to {:?}", command))
            })??;
        if n == 0 {
            return Err(RelayError::Transport(
                "Controller closed the connection".to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&buffer[..n]).trim().to_string())
    }
}

#[async_trait]
impl CommandChannel for DashboardSession {
    #[instrument(skip(self), fields(controller = %self.config.address()))]
    async fn send(&mut self, command: &str) -> Result<String> {
        if self.stream.is_none() {
            info!("Opening controller session");
            self.open().await?;
        }

        info!(">>> {}", command);
        match self.exchange(command).await {
            Ok(response) => {
                info!("<<< {}", response);
                Ok(response)
            }
            Err(e) => {
                if e.is_transport() {
                    warn!("Controller session lost: {}", e);
                    self.stream = None;
                }
                Err(e)
            }
        }
    }

    fn endpoint(&self) -> String {
        self.config.address()
    }
}

/// One scripted reply for [`MockChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Text(String),
    /// The session drops on this command
    Disconnect,
}

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<String, VecDeque<MockReply>>,
    sent: Vec<String>,
}

/// Scripted command channel for testing
///
/// Replies are queued per command verb (`running`, `stop`, `load`, `play`).
/// When a queue is empty the verb's happy-path reply is used, e.g.
/// `running` answers `false`. Clones share state, so a test can keep a
/// handle after moving the channel into an executor.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next command starting with `verb`
    pub fn with_reply(self, verb: &str, reply: &str) -> Self {
        self.push(verb, MockReply::Text(reply.to_string()));
        self
    }

    /// Queue several `running` replies, e.g. `&[true, true, false]`
    pub fn with_running(self, states: &[bool]) -> Self {
        for busy in states {
            let reply = format!("Program running: {}", busy);
            self.push("running", MockReply::Text(reply));
        }
        self
    }

    pub fn with_disconnect(self, verb: &str) -> Self {
        self.push(verb, MockReply::Disconnect);
        self
    }

    pub fn push(&self, verb: &str, reply: MockReply) {
        self.lock()
            .replies
            .entry(verb.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Every command sent so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    /// How many commands with this verb were sent
    pub fn count(&self, verb: &str) -> usize {
        self.lock()
            .sent
            .iter()
            .filter(|command| verb_of(command) == verb)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn verb_of(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}

fn default_reply(command: &str) -> String {
    match verb_of(command) {
        "running" => "Program running: false".to_string(),
        "stop" => "Stopped".to_string(),
        "load" => format!("Loading program: {}", command.trim_start_matches("load ")),
        "play" => "Starting program".to_string(),
        other => format!("could not understand: '{}'", other),
    }
}

#[async_trait]
impl CommandChannel for MockChannel {
    async fn send(&mut self, command: &str) -> Result<String> {
        let mut state = self.lock();
        state.sent.push(command.to_string());
        let scripted = state
            .replies
            .get_mut(verb_of(command))
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(MockReply::Text(reply)) => Ok(reply),
            Some(MockReply::Disconnect) => {
                debug!("Mock controller dropping session on {:?}", command);
                Err(RelayError::Transport("mock controller reset".to_string()))
            }
            None => Ok(default_reply(command)),
        }
    }

    fn endpoint(&self) -> String {
        "mock".to_string()
    }
}
