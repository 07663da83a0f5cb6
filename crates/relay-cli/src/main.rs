//! Relay CLI - remote instructions to robot programs
//!
//! Usage:
//!   relay run                      Watch the instruction file and act on changes
//!   relay ask <instruction>        Ask the completion service, print the actions
//!   relay send <command>...        Send raw dashboard commands
//!   relay execute <program>...     Run programs through the action executor
//!   relay init [path]              Write a default relay.toml

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use relay_agent::CompletionAgent;
use relay_controller::{ActionExecutor, CommandChannel, DashboardSession};
use relay_core::{Action, RelayConfig};
use relay_orchestrator::Orchestrator;
use relay_watch::{ChangeWatcher, RemoteSource, SftpSource};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Environment variable holding an `EnvFilter` directive, e.g. `relay_watch=debug`
const LOG_ENV: &str = "RELAY_LOG";

#[derive(Parser)]
#[command(name = "relay")]
#[command(author, version, about = "Turn remote instructions into robot programs")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (TOML, or YAML with an `llm:` section)
    #[arg(short, long, default_value = "relay.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the instruction file and drive the controller
    Run,

    /// Ask the completion service once and print the actions as JSON
    Ask {
        /// Instruction text
        instruction: String,
    },

    /// Send raw dashboard commands and print each reply
    Send {
        /// Commands, sent in order (e.g. `running` `"load /programs/a.urp"`)
        #[arg(required = true)]
        commands: Vec<String>,
    },

    /// Run programs on the controller, one after another
    Execute {
        /// Program names, relative to the programs folder or absolute
        #[arg(required = true)]
        programs: Vec<String>,
    },

    /// Write a default configuration file
    Init {
        /// Destination (defaults to relay.toml)
        #[arg(default_value = "relay.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run => cmd_run(&cli.config).await,
        Commands::Ask { instruction } => cmd_ask(&cli.config, &instruction).await,
        Commands::Send { commands } => cmd_send(&cli.config, &commands).await,
        Commands::Execute { programs } => cmd_execute(&cli.config, &programs).await,
        Commands::Init { path, force } => cmd_init(&path, force),
    }
}

fn load_config(path: &Path) -> Result<RelayConfig> {
    let config = RelayConfig::load_or_default(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    if !path.exists() {
        info!("{} not found, using defaults", path.display());
    }
    Ok(config)
}

async fn cmd_run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    info!("Starting Relay pipeline");

    // Unreachable peers at startup are not fatal: the watcher reconnects
    // until the SFTP server answers, and the controller session opens on the
    // first command.
    let mut source = SftpSource::new(config.watch.clone());
    if let Err(e) = source.connect().await {
        warn!("SFTP server not reachable yet ({}); retrying in the background", e);
    }
    let watcher = ChangeWatcher::new(source, &config.watch);

    let agent = CompletionAgent::new(config.agent.clone())?;

    let session = match DashboardSession::connect(config.controller.clone()).await {
        Ok(session) => session,
        Err(e) => {
            warn!("Controller not reachable yet ({}); will connect on first action", e);
            DashboardSession::new(config.controller.clone())
        }
    };
    let executor = ActionExecutor::new(session, config.controller.clone());

    Orchestrator::new(watcher, agent, executor, config.orchestrator.clone())
        .run()
        .await;
    Ok(())
}

async fn cmd_ask(config_path: &Path, instruction: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let agent = CompletionAgent::new(config.agent)?;

    let actions = agent.process_default(instruction).await;
    println!("{}", serde_json::to_string_pretty(&actions)?);
    Ok(())
}

async fn cmd_send(config_path: &Path, commands: &[String]) -> Result<()> {
    let config = load_config(config_path)?;
    let mut session = DashboardSession::connect(config.controller)
        .await
        .context("Failed to connect to the robot controller")?;

    if let Some(greeting) = session.greeting() {
        println!("{}", greeting);
    }
    for command in commands {
        let reply = session.send(command).await?;
        println!("{} -> {}", command, reply);
    }
    Ok(())
}

async fn cmd_execute(config_path: &Path, programs: &[String]) -> Result<()> {
    let config = load_config(config_path)?;
    let session = DashboardSession::connect(config.controller.clone())
        .await
        .context("Failed to connect to the robot controller")?;
    let mut executor = ActionExecutor::new(session, config.controller);

    let actions: Vec<Action> = programs.iter().map(Action::new).collect();
    let outcomes = executor.execute(&actions).await?;

    for (action, outcome) in actions.iter().zip(&outcomes) {
        println!("{:<32} {}", action.program, outcome);
    }
    Ok(())
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    RelayConfig::write_default(path)?;
    println!("Wrote default configuration to {}", path.display());
    println!("Edit the [watch], [llm] and [controller] sections before `relay run`.");
    Ok(())
}
