//! Dashboard server command vocabulary
//!
//! Commands are single text lines; replies are free text. Only the fragments
//! below carry meaning for the executor.

use tracing::warn;

/// Reply fragments meaning `load` did not work
const LOAD_FAILURES: [&str; 2] = ["File not found", "Loading program failed"];

/// Reply fragments meaning `play` did not work
const PLAY_FAILURES: [&str; 2] = ["Failed to execute", "Starting program failed"];

/// Commands the executor sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardCommand {
    /// Ask whether a program is currently running
    Running,
    /// Stop whatever is loaded
    Stop,
    /// Load a program by absolute path
    Load(String),
    /// Start the loaded program
    Play,
}

impl std::fmt::Display for DashboardCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stop => write!(f, "stop"),
            Self::Load(path) => write!(f, "load {}", path),
            Self::Play => write!(f, "play"),
        }
    }
}

/// Whether a `running` reply says a program is executing
///
/// The reply contains `true` or `false` in any case. Anything else is
/// treated as idle.
pub fn is_running(response: &str) -> bool {
    let lower = response.to_lowercase();
    if lower.contains("true") {
        return true;
    }
    if !lower.contains("false") {
        warn!("Unexpected reply to running: {:?}; assuming idle", response);
    }
    false
}

pub fn load_failed(response: &str) -> bool {
    LOAD_FAILURES.iter().any(|phrase| response.contains(phrase))
}

pub fn play_failed(response: &str) -> bool {
    PLAY_FAILURES.iter().any(|phrase| response.contains(phrase))
}

/// Absolute controller path for a program name
///
/// Absolute names are kept as they are; relative ones are placed in `folder`.
pub fn program_path(folder: &str, program: &str) -> String {
    let program = program.trim();
    if program.starts_with('/') {
        return program.to_string();
    }
    format!("{}/{}", folder.trim_end_matches('/'), program)
}
