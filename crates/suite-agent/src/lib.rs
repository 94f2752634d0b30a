//! Suite Agent - the background agent of the Utility Suite.
//!
//! This crate provides:
//! - The [`Scheduler`] driving tasks through `Idle`/`Running`/`Stopped`/`Failed`
//! - Execution units: in-process for light tasks, worker processes for heavy ones
//! - The control channel (length-prefixed JSON over a Unix socket): protocol,
//!   server and client
//! - [`HostRuntime`], which assembles registry, loader, dispatcher and context
//! - The [`Agent`] lifecycle (pid file, socket, status snapshot)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod agent;
pub mod client;
pub mod error;
pub mod paths;
pub mod protocol;
pub mod runtime;
pub mod scheduler;
pub mod server;
pub mod task;
pub mod unit;

pub use agent::{Agent, AgentStatus, ReloadOutcome, WORKER_SUBCOMMAND};
pub use client::ControlClient;
pub use error::{AgentError, AgentResult, ProtocolError};
pub use paths::{AgentPaths, pid_is_alive};
pub use protocol::{Command, ControlRequest, ControlResponse};
pub use runtime::{HostRuntime, default_broker, package_root};
pub use scheduler::{ReloadSummary, Scheduler};
pub use server::{ControlHandler, ControlServer, ServerSettings};
pub use task::{LastRun, TaskSpec, TaskState, TaskStatus};
pub use unit::{ExecutionUnit, ExecutionUnits, InProcessUnit, WorkerProcessUnit};
