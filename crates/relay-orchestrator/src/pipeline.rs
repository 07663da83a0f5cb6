//! Change-to-execution pipeline

use relay_agent::CompletionAgent;
use relay_controller::{ActionExecutor, CommandChannel};
use relay_core::{ExecutionOutcome, Instruction, OrchestratorConfig, RelayError, Result};
use relay_watch::{ChangeWatcher, FileChange, RemoteSource};
use tracing::{debug, error, info, warn};

/// What happened to one observed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// First content of the run; recorded, never acted on
    Baseline,
    /// Same text as the last accepted content
    Unchanged,
    /// Content was not a usable instruction
    Rejected(String),
    /// The completion service produced no actions
    NoActions,
    /// Actions ran; one outcome per action, in order
    Executed(Vec<ExecutionOutcome>),
}

/// Runs the watch, complete, execute cycle
pub struct Orchestrator<S: RemoteSource, C: CommandChannel> {
    watcher: ChangeWatcher<S>,
    agent: CompletionAgent,
    executor: ActionExecutor<C>,
    config: OrchestratorConfig,
    last_accepted: Option<String>,
}

impl<S: RemoteSource, C: CommandChannel> Orchestrator<S, C> {
    pub fn new(
        watcher: ChangeWatcher<S>,
        agent: CompletionAgent,
        executor: ActionExecutor<C>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            watcher,
            agent,
            executor,
            config,
            last_accepted: None,
        }
    }

    /// Content most recently accepted for processing
    pub fn last_accepted(&self) -> Option<&str> {
        self.last_accepted.as_deref()
    }

    pub fn executor(&self) -> &ActionExecutor<C> {
        &self.executor
    }

    /// Wait for the next change and handle it
    pub async fn process_next(&mut self) -> Result<ChangeOutcome> {
        let change = self.watcher.next_change().await;
        self.handle_change(change).await
    }

    /// Handle one change
    ///
    /// Schema problems are reported as [`ChangeOutcome::Rejected`]; only
    /// controller transport failures come back as errors.
    pub async fn handle_change(&mut self, change: FileChange) -> Result<ChangeOutcome> {
        let Some(previous) = self.last_accepted.as_deref() else {
            info!(
                "Baseline content for {} recorded ({}); waiting for changes",
                change.path,
                change.fingerprint.short()
            );
            self.last_accepted = Some(change.content);
            return Ok(ChangeOutcome::Baseline);
        };

        if previous == change.content {
            debug!("Content of {} matches the last accepted text", change.path);
            return Ok(ChangeOutcome::Unchanged);
        }

        info!("New content in {}", change.path);
        self.last_accepted = Some(change.content.clone());

        let instruction = match Instruction::from_content(&change.content) {
            Ok(instruction) => instruction,
            Err(e @ (RelayError::Serialization(_) | RelayError::Schema(_))) => {
                error!("Dropping change to {}: {}", change.path, e);
                return Ok(ChangeOutcome::Rejected(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        info!("Instruction: {}", instruction);
        let actions = self.agent.process_default(instruction.as_str()).await;
        if actions.is_empty() {
            info!("No actions returned; nothing to do");
            return Ok(ChangeOutcome::NoActions);
        }

        let programs: Vec<&str> = actions.iter().map(|a| a.program.as_str()).collect();
        info!("Executing {} action(s): {:?}", actions.len(), programs);

        let outcomes = self.executor.execute(&actions).await?;
        Ok(ChangeOutcome::Executed(outcomes))
    }

    /// Run forever
    ///
    /// Errors are logged and followed by `error_backoff` before the next
    /// change is awaited.
    pub async fn run(mut self) {
        info!(
            "Watching {} on {}; controller {}",
            self.watcher.resource().path,
            self.watcher.endpoint(),
            self.executor.channel().endpoint()
        );

        loop {
            match self.process_next().await {
                Ok(outcome) => debug!("Change handled: {:?}", outcome),
                Err(e) => {
                    error!("Pipeline error: {}", e);
                    warn!("Resuming in {:?}", self.config.error_backoff());
                    tokio::time::sleep(self.config.error_backoff()).await;
                }
            }
        }
    }
}
