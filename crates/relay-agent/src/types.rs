//! Wire types for the generate endpoint

use serde::{Deserialize, Serialize};

/// Request body for a streaming generate call
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
}

/// One newline-delimited event of the response stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GenerateEvent {
    /// Incremental text fragment
    #[serde(default)]
    pub response: Option<String>,

    /// Set on the final event
    #[serde(default)]
    pub done: bool,
}
