//! Configuration management for Relay
//!
//! One [`RelayConfig`] is loaded at startup and split into per-component
//! sections that are handed to each constructor. Nothing reads configuration
//! after startup.
//!
//! Both TOML (`relay.toml`) and YAML (`prompt.yaml` style, with a top-level
//! `llm:` section) files are accepted; the format is picked from the extension.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{RelayError, Result};

/// Top-level Relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Remote instruction file
    #[serde(default)]
    pub watch: WatchConfig,

    /// Completion service
    #[serde(default, rename = "llm")]
    pub agent: AgentConfig,

    /// Robot dashboard server
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Pipeline loop
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Where the instruction file lives and how often to poll it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub host: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    pub username: String,

    /// Private key used for public key authentication
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Environment variable holding the SSH password (or key passphrase)
    #[serde(default)]
    pub password_env: Option<String>,

    /// Absolute path of the watched file on the remote host
    pub remote_path: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Completion service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Generate endpoint, e.g. `http://localhost:11434/api/generate`
    pub url: String,

    pub model_name: String,

    /// Prepended to every instruction
    #[serde(default)]
    pub system_prompt: String,

    /// Total attempts before giving up with an empty action list
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

/// Robot dashboard server settings and pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub host: String,

    #[serde(default = "default_dashboard_port")]
    pub port: u16,

    /// Folder relative program names are resolved against
    #[serde(default = "default_programs_folder")]
    pub programs_folder: String,

    /// Pause between writing a command and reading its reply
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Pause after `stop` before loading the next program
    #[serde(default = "default_reset_settle_ms")]
    pub reset_settle_ms: u64,

    /// Poll delay while waiting for a previous program to finish
    #[serde(default = "default_busy_poll_ms")]
    pub busy_poll_ms: u64,

    /// Pause after `play` before the first `running` poll
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,

    /// Poll delay while our own program runs
    #[serde(default = "default_run_poll_ms")]
    pub run_poll_ms: u64,

    /// Log a progress line every N running polls
    #[serde(default = "default_heartbeat_every")]
    pub heartbeat_every: u32,

    #[serde(default = "default_read_buffer")]
    pub read_buffer: usize,

    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Pipeline loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pause after an unexpected error before polling again
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

// Default value providers
fn default_ssh_port() -> u16 {
    22
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_reconnect_backoff_ms() -> u64 {
    2000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_dashboard_port() -> u16 {
    29999
}

fn default_programs_folder() -> String {
    "/programs/interaction".to_string()
}

fn default_settle_ms() -> u64 {
    200
}

fn default_reset_settle_ms() -> u64 {
    300
}

fn default_busy_poll_ms() -> u64 {
    1000
}

fn default_start_delay_ms() -> u64 {
    500
}

fn default_run_poll_ms() -> u64 {
    500
}

fn default_heartbeat_every() -> u32 {
    10
}

fn default_read_buffer() -> usize {
    4096
}

fn default_read_timeout_secs() -> u64 {
    10
}

fn default_error_backoff_ms() -> u64 {
    1000
}

impl RelayConfig {
    /// Load configuration from a TOML or YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                RelayError::Config(format!("Failed to parse config file: {}", e))
            })?,
            _ => toml::from_str(&content).map_err(|e| {
                RelayError::Config(format!("Failed to parse config file: {}", e))
            })?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path` or fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default configuration as TOML
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&Self::default()).map_err(|e| {
            RelayError::Config(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations that cannot possibly connect anywhere
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("watch.host", self.watch.host.as_str()),
            ("watch.username", self.watch.username.as_str()),
            ("watch.remote_path", self.watch.remote_path.as_str()),
            ("llm.url", self.agent.url.as_str()),
            ("llm.model_name", self.agent.model_name.as_str()),
            ("controller.host", self.controller.host.as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(RelayError::Config(format!("{} must not be empty", key)));
            }
        }
        if self.controller.read_buffer == 0 {
            return Err(RelayError::Config(
                "controller.read_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Resolve the password from the configured environment variable
    pub fn password(&self) -> Option<String> {
        self.password_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty())
    }
}

impl AgentConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ControllerConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn busy_poll(&self) -> Duration {
        Duration::from_millis(self.busy_poll_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn run_poll(&self) -> Duration {
        Duration::from_millis(self.run_poll_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// `host:port` of the dashboard server
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Zero delays everywhere; used by tests and dry runs
    pub fn immediate(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            settle_ms: 0,
            reset_settle_ms: 0,
            busy_poll_ms: 0,
            start_delay_ms: 0,
            run_poll_ms: 0,
            ..Self::default()
        }
    }
}

impl OrchestratorConfig {
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_ssh_port(),
            username: "ubuntu".to_string(),
            key_file: None,
            password_env: None,
            remote_path: "/home/ubuntu/instructions.json".to_string(),
            poll_interval_ms: default_poll_interval_ms(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/api/generate".to_string(),
            model_name: "phi4:latest".to_string(),
            system_prompt: String::new(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_dashboard_port(),
            programs_folder: default_programs_folder(),
            settle_ms: default_settle_ms(),
            reset_settle_ms: default_reset_settle_ms(),
            busy_poll_ms: default_busy_poll_ms(),
            start_delay_ms: default_start_delay_ms(),
            run_poll_ms: default_run_poll_ms(),
            heartbeat_every: default_heartbeat_every(),
            read_buffer: default_read_buffer(),
            read_timeout_secs: default_read_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}
