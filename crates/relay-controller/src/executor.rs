//! Action executor
//!
//! Each action walks a small state machine. The transition function is pure:
//! it takes the current phase and the controller's reply and returns the next
//! phase plus how long to pause. All I/O lives in [`ActionExecutor`].
//!
//! ```text
//! CheckBusy --idle--> Reset --> Load --ok--> Play --ok--> Running --idle--> Done(Completed)
//!    ^  |busy                     |failed      |failed      ^  |busy
//!    +--+                         v            v            +--+
//!                       Done(SkippedNotFound)  Done(SkippedPlayFailed)
//! ```

use crate::channel::CommandChannel;
use crate::protocol::{is_running, load_failed, play_failed, program_path, DashboardCommand};
use relay_core::{Action, ControllerConfig, ExecutionOutcome, RelayError, Result};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where one action currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for a previous program to finish
    CheckBusy,
    /// Clearing residual controller state
    Reset,
    Load,
    Play,
    /// Our program is executing; `polls` counts busy replies so far
    Running { polls: u32 },
    Done(ExecutionOutcome),
}

/// Delay to apply after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    None,
    BusyPoll,
    ResetSettle,
    StartDelay,
    RunPoll,
}

impl Phase {
    /// The command this phase sends, `None` once the action is done
    pub fn command(&self, program_path: &str) -> Option<DashboardCommand> {
        match self {
            Self::CheckBusy | Self::Running { .. } => Some(DashboardCommand::Running),
            Self::Reset => Some(DashboardCommand::Stop),
            Self::Load => Some(DashboardCommand::Load(program_path.to_string())),
            Self::Play => Some(DashboardCommand::Play),
            Self::Done(_) => None,
        }
    }
}

/// Pure state transition function
///
/// Takes the current phase and the reply to its command. Never panics; a
/// finished phase stays finished.
pub fn transition(phase: Phase, response: &str) -> (Phase, Pause) {
    match phase {
        Phase::CheckBusy => {
            if is_running(response) {
                (Phase::CheckBusy, Pause::BusyPoll)
            } else {
                (Phase::Reset, Pause::None)
            }
        }
        Phase::Reset => (Phase::Load, Pause::ResetSettle),
        Phase::Load => {
            if load_failed(response) {
                (Phase::Done(ExecutionOutcome::SkippedNotFound), Pause::None)
            } else {
                (Phase::Play, Pause::None)
            }
        }
        Phase::Play => {
            if play_failed(response) {
                (Phase::Done(ExecutionOutcome::SkippedPlayFailed), Pause::None)
            } else {
                (Phase::Running { polls: 0 }, Pause::StartDelay)
            }
        }
        Phase::Running { polls } => {
            if is_running(response) {
                (Phase::Running { polls: polls + 1 }, Pause::RunPoll)
            } else {
                (Phase::Done(ExecutionOutcome::Completed), Pause::None)
            }
        }
        done @ Phase::Done(_) => (done, Pause::None),
    }
}

/// Approximate run time to report after `polls` busy replies, if a progress
/// line is due. One is due every `heartbeat_every` polls (0 counts as 1).
pub fn heartbeat(polls: u32, config: &ControllerConfig) -> Option<Duration> {
    let every = config.heartbeat_every.max(1);
    (polls > 0 && polls % every == 0).then(|| config.run_poll() * polls)
}

/// Runs actions on the controller, strictly one after another
pub struct ActionExecutor<C: CommandChannel> {
    channel: C,
    config: ControllerConfig,
}

impl<C: CommandChannel> ActionExecutor<C> {
    pub fn new(channel: C, config: ControllerConfig) -> Self {
        Self { channel, config }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Run every action in order
    ///
    /// A program that cannot be loaded or started is skipped; the batch goes
    /// on. Only a transport failure stops the batch early.
    pub async fn execute(&mut self, actions: &[Action]) -> Result<Vec<ExecutionOutcome>> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for (index, action) in actions.iter().enumerate() {
            info!(
                "Action {}/{}: {}",
                index + 1,
                actions.len(),
                action.program
            );
            outcomes.push(self.execute_one(action).await?);
        }

        let completed = outcomes
            .iter()
            .filter(|o| **o == ExecutionOutcome::Completed)
            .count();
        info!(
            "Batch finished: {} of {} action(s) completed",
            completed,
            outcomes.len()
        );
        Ok(outcomes)
    }

    /// Drive one action to a terminal phase
    pub async fn execute_one(&mut self, action: &Action) -> Result<ExecutionOutcome> {
        let path = program_path(&self.config.programs_folder, &action.program);
        let mut phase = Phase::CheckBusy;
        debug!("Checking if robot is currently running a program...");

        while let Some(command) = phase.command(&path) {
            let response = self.channel.send(&command.to_string()).await?;
            let (next, pause) = transition(phase.clone(), &response);
            self.report(&phase, &next, &path);
            self.pause(pause).await;
            phase = next;
        }

        match phase {
            Phase::Done(outcome) => Ok(outcome),
            other => Err(RelayError::Controller(format!(
                "{} stopped in phase {:?}",
                path, other
            ))),
        }
    }

    fn report(&self, from: &Phase, to: &Phase, path: &str) {
        match (from, to) {
            (Phase::CheckBusy, Phase::CheckBusy) => {
                info!("Robot is running, waiting for completion...")
            }
            (Phase::CheckBusy, Phase::Reset) => {
                info!("Robot is ready. Loading program: {}", path)
            }
            (_, Phase::Done(ExecutionOutcome::SkippedNotFound)) => {
                warn!("Program '{}' not found. Skipping.", path)
            }
            (_, Phase::Done(ExecutionOutcome::SkippedPlayFailed)) => warn!(
                "Program '{}' could not play. Make sure the robot is in the correct start pose.",
                path
            ),
            (Phase::Play, Phase::Running { .. }) => {
                info!("Started {}, waiting for program to complete...", path)
            }
            (_, Phase::Running { polls }) => {
                if let Some(elapsed) = heartbeat(*polls, &self.config) {
                    info!(
                        "Program still running... ({:.1}s elapsed)",
                        elapsed.as_secs_f64()
                    );
                }
            }
            (_, Phase::Done(ExecutionOutcome::Completed)) => {
                info!("Program '{}' completed.", path)
            }
            _ => {}
        }
    }

    async fn pause(&self, pause: Pause) {
        let duration = match pause {
            Pause::None => return,
            Pause::BusyPoll => self.config.busy_poll(),
            Pause::ResetSettle => self.config.reset_settle(),
            Pause::StartDelay => self.config.start_delay(),
            Pause::RunPoll => self.config.run_poll(),
        };
        tokio::time::sleep(duration).await;
    }
}
