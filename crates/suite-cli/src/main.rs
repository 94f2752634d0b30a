//! Utility Suite CLI.
//!
//! A thin front-end over the host runtime: lists and toggles packages,
//! dispatches single features, and talks to the background agent over its
//! control channel.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use suite_cli::Session;
use suite_cli::theme::Theme;
use suite_telemetry::LogTarget;

mod commands;

use commands::{OutputFormat, agent, packages, run};

/// Utility Suite - pluggable system utilities
#[derive(Parser)]
#[command(name = "suite")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty (default) or json
    #[arg(long, global = true, default_value = "pretty")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage installed packages
    Packages {
        #[command(subcommand)]
        command: PackageCommands,
    },

    /// Run one feature of a package
    Run {
        /// Package id
        package: String,
        /// Feature id
        feature: String,
        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },

    /// Control the background agent
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
}

#[derive(Subcommand)]
enum PackageCommands {
    /// List packages and their features
    List {
        /// Rediscover the package root before listing
        #[arg(long)]
        refresh: bool,
    },
    /// Enable a package
    Enable {
        /// Package id
        id: String,
    },
    /// Disable a package
    Disable {
        /// Package id
        id: String,
    },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Show agent and task status
    Status,
    /// Start (or restart) a task now
    StartTask {
        /// Task id
        id: String,
    },
    /// Stop a task
    StopTask {
        /// Task id
        id: String,
    },
    /// Re-read config.toml and reconcile tasks
    Reload,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let session = match Session::load() {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("{e:#}")));
            return ExitCode::FAILURE;
        },
    };

    // Keep stdout for results; diagnostics go to stderr.
    let level = if cli.verbose { "debug" } else { "warn" };
    let _guard = match suite_telemetry::setup_logging(&session.log_config(level, LogTarget::Stderr)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        },
    };

    let format = match cli.format.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Pretty,
    };

    match dispatch(cli.command, &session, format).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", Theme::error(&format!("{e:#}")));
            ExitCode::FAILURE
        },
    }
}

async fn dispatch(command: Commands, session: &Session, format: OutputFormat) -> Result<bool> {
    match command {
        Commands::Packages { command } => {
            handle_packages(command, session, format)?;
            Ok(true)
        },
        Commands::Run {
            package,
            feature,
            args,
        } => run::run_feature(session, &package, &feature, args.as_deref(), format),
        Commands::Agent { command } => {
            handle_agent(command, session, format).await?;
            Ok(true)
        },
    }
}

fn handle_packages(command: PackageCommands, session: &Session, format: OutputFormat) -> Result<()> {
    match command {
        PackageCommands::List { refresh } => packages::list_packages(session, refresh, format),
        PackageCommands::Enable { id } => packages::set_enabled(session, &id, true, format),
        PackageCommands::Disable { id } => packages::set_enabled(session, &id, false, format),
    }
}

async fn handle_agent(command: AgentCommands, session: &Session, format: OutputFormat) -> Result<()> {
    match command {
        AgentCommands::Status => agent::agent_status(session, format).await,
        AgentCommands::StartTask { id } => agent::start_task(session, &id, format).await,
        AgentCommands::StopTask { id } => agent::stop_task(session, &id, format).await,
        AgentCommands::Reload => agent::reload(session, format).await,
    }
}
