//! `suited` - the Utility Suite background agent.
//!
//! With no subcommand it runs the agent until interrupted. `suited worker`
//! runs exactly one dispatch for a heavy task: args JSON on stdin, result
//! envelope JSON on stdout.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use suite_agent::{Agent, WORKER_SUBCOMMAND};
use suite_cli::Session;
use suite_cli::theme::Theme;
use suite_telemetry::LogTarget;

/// Utility Suite agent - scheduled background tasks.
#[derive(Parser)]
#[command(name = "suited")]
#[command(author, version, about = "Utility Suite agent - scheduled background tasks")]
struct Args {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<AgentCommand>,
}

#[derive(Subcommand)]
enum AgentCommand {
    /// Run the agent in the foreground (the default).
    Run,
    /// Dispatch one feature and print the envelope (used for heavy tasks).
    #[command(name = WORKER_SUBCOMMAND)]
    Worker {
        /// Package id.
        #[arg(long)]
        package: String,
        /// Feature id.
        #[arg(long)]
        feature: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let session = Session::load()?;

    match args.command.unwrap_or(AgentCommand::Run) {
        AgentCommand::Run => run_agent(&session, args.verbose).await,
        AgentCommand::Worker { package, feature } => run_worker(&session, &package, &feature),
    }
}

async fn run_agent(session: &Session, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug"
    } else {
        session.config.host.log_level.as_str()
    };
    let log_config = session.log_config(level, session.file_target("suited"));
    let _guard = match suite_telemetry::setup_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            suite_telemetry::setup_default_logging().ok()
        },
    };

    let runtime = session.open_runtime()?;
    let worker = std::env::current_exe().context("failed to locate the suited binary")?;
    let units = Agent::default_units(&runtime, &session.config, worker);
    let agent = Agent::new(runtime, session.config.clone(), units);

    println!(
        "{}",
        format!("suited listening on {}", agent.socket_path().display())
            .cyan()
            .bold()
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(forward_signals(shutdown.clone()));
    agent.run(shutdown).await?;

    info!("agent exited cleanly");
    println!("{}", Theme::success("Agent stopped"));
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn forward_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            },
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    shutdown.cancel();
}

fn run_worker(session: &Session, package: &str, feature: &str) -> Result<()> {
    // stdout carries the envelope, so logs stay on stderr.
    let _guard = suite_telemetry::setup_logging(
        &session.log_config(&session.config.host.log_level, LogTarget::Stderr),
    )
    .ok();

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read args from stdin")?;

    let runtime = session.open_runtime()?;
    let envelope = runtime.dispatch_json(package, feature, &input);
    println!("{}", serde_json::to_string(&envelope)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_worker_invocation_matches_heavy_units() {
        let args = Args::try_parse_from([
            "suited",
            WORKER_SUBCOMMAND,
            "--package",
            "filesystem",
            "--feature",
            "disk_space",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Some(AgentCommand::Worker { ref package, ref feature })
                if package == "filesystem" && feature == "disk_space"
        ));
    }
}
