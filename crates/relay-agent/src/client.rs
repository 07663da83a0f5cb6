//! Streaming completion client
//!
//! Key design: every instruction is a fresh, stateless request. No
//! conversation history is kept between instructions.

use crate::response::extract_actions;
use crate::stream::{NdjsonStreamParser, StreamAccumulator};
use crate::types::GenerateRequest;
use futures::StreamExt;
use relay_core::fail_open::fail_open_with_retries;
use relay_core::{Action, AgentConfig, RelayError, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client that turns a free-text instruction into controller actions
#[derive(Debug, Clone)]
pub struct CompletionAgent {
    config: AgentConfig,
    http: reqwest::Client,
}

impl CompletionAgent {
    /// Create a new agent for the configured endpoint
    pub fn new(config: AgentConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// System prompt and instruction, joined by a newline
    pub fn build_prompt(&self, instruction: &str) -> String {
        format!("{}\n{}", self.config.system_prompt, instruction)
    }

    /// Ask for actions using the configured request timeout
    pub async fn process_default(&self, instruction: &str) -> Vec<Action> {
        self.process(instruction, self.config.timeout()).await
    }

    /// Ask the completion service which actions to run for `instruction`
    ///
    /// Never fails: after `max_retries` failed attempts the result is an empty
    /// list.
    pub async fn process(&self, instruction: &str, timeout: Duration) -> Vec<Action> {
        let request = GenerateRequest {
            model: self.config.model_name.clone(),
            prompt: self.build_prompt(instruction),
            stream: true,
        };

        info!(
            "Asking {} for actions: {:?}",
            self.config.model_name, instruction
        );

        let agent = self;
        let request = &request;
        let actions = fail_open_with_retries(
            "Completion request",
            move || agent.attempt(request, timeout),
            self.config.max_retries,
            self.config.retry_backoff(),
        )
        .await;

        match actions {
            Some(actions) => {
                info!("Completion returned {} action(s)", actions.len());
                actions
            }
            None => {
                warn!(
                    "No usable completion after {} attempt(s); nothing to execute",
                    self.config.max_retries.max(1)
                );
                Vec::new()
            }
        }
    }

    /// One request: stream, collect, parse
    async fn attempt(&self, request: &GenerateRequest, timeout: Duration) -> Result<Vec<Action>> {
        let text = self.stream_text(request, timeout).await?;
        debug!("Completion text ({} chars): {}", text.len(), text);
        extract_actions(&text)
    }

    /// Send the request and concatenate streamed fragments until `done`
    async fn stream_text(&self, request: &GenerateRequest, timeout: Duration) -> Result<String> {
        let response = self
            .http
            .post(&self.config.url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| RelayError::Completion(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            return Err(RelayError::Completion(format!(
                "Endpoint returned {}: {}",
                status, error_text
            )));
        }

        let mut bytes = response.bytes_stream();
        let mut parser = NdjsonStreamParser::default();
        let mut acc = StreamAccumulator::default();

        'stream: while let Some(chunk) = bytes.next().await {
            let chunk =
                chunk.map_err(|e| RelayError::Completion(format!("Stream interrupted: {}", e)))?;
            for event in parser.feed(&chunk) {
                if acc.push(event) {
                    break 'stream;
                }
            }
        }

        if !acc.is_done() {
            if let Some(event) = parser.finish() {
                acc.push(event);
            }
        }
        if !acc.is_done() {
            warn!("Completion stream ended without a done event");
        }

        Ok(acc.finish())
    }
}
