//! Agent lifecycle.
//!
//! The agent owns the scheduler, serves the control channel and keeps a pid
//! file so a second agent on the same home refuses to start.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use suite_config::Config;
use suite_core::atomic_write;

use crate::error::{AgentError, AgentResult};
use crate::paths::{AgentPaths, pid_is_alive};
use crate::protocol::{ControlResponse, ERR_RELOAD_FAILED, ERR_UNKNOWN_TASK};
use crate::runtime::{HostRuntime, package_root};
use crate::scheduler::{ReloadSummary, Scheduler};
use crate::server::{ControlHandler, ControlServer, ServerSettings};
use crate::task::TaskSpec;
use crate::unit::{ExecutionUnits, InProcessUnit, WorkerProcessUnit};

/// How long in-flight runs get to wind down on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Subcommand of the agent binary that runs one heavy task execution.
pub const WORKER_SUBCOMMAND: &str = "worker";

/// The background agent.
pub struct Agent {
    runtime: HostRuntime,
    paths: AgentPaths,
    config: Mutex<Config>,
    scheduler: Arc<Scheduler>,
    started_at: DateTime<Utc>,
    started: Instant,
    this: Weak<Agent>,
}

impl Agent {
    /// Agent over `runtime`, scheduling the tasks of `config` on `units`.
    #[must_use]
    pub fn new(runtime: HostRuntime, config: Config, units: ExecutionUnits) -> Arc<Self> {
        let paths = AgentPaths::for_home(runtime.home());
        let specs = config.tasks.iter().map(TaskSpec::from).collect();
        let scheduler = Scheduler::new(
            specs,
            units,
            config.agent.max_consecutive_failures,
            Some(paths.status_file()),
        );
        Arc::new_cyclic(|this| Self {
            runtime,
            paths,
            config: Mutex::new(config),
            scheduler,
            started_at: Utc::now(),
            started: Instant::now(),
            this: this.clone(),
        })
    }

    /// Light tasks in-process, heavy tasks in `worker_program worker ...`.
    ///
    /// Workers inherit this agent's home through `SUITE_HOME`.
    #[must_use]
    pub fn default_units(
        runtime: &HostRuntime,
        config: &Config,
        worker_program: impl Into<PathBuf>,
    ) -> ExecutionUnits {
        let light = InProcessUnit::new(runtime.dispatcher().clone(), runtime.context().clone());
        let heavy = WorkerProcessUnit::new(
            worker_program,
            vec![WORKER_SUBCOMMAND.to_string()],
            Duration::from_secs(config.agent.worker_timeout_secs),
        )
        .with_env("SUITE_HOME", runtime.home().root().display().to_string());
        ExecutionUnits::new(Arc::new(light), Arc::new(heavy))
    }

    /// Agent file paths.
    #[must_use]
    pub fn paths(&self) -> &AgentPaths {
        &self.paths
    }

    /// The scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// The runtime tasks dispatch through.
    #[must_use]
    pub fn runtime(&self) -> &HostRuntime {
        &self.runtime
    }

    fn config(&self) -> MutexGuard<'_, Config> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Control socket this agent listens on.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.paths
            .resolve_socket(self.config().control.socket_path.as_deref())
    }

    /// Run until `shutdown` fires: write the pid file, serve the control
    /// channel, drive the scheduler, then clean up.
    ///
    /// # Errors
    ///
    /// [`AgentError::AlreadyRunning`] if another live agent owns the pid
    /// file, or an error binding the control socket.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> AgentResult<()> {
        self.acquire_pid_file()?;
        let result = self.serve(&shutdown).await;
        self.cleanup();
        result
    }

    async fn serve(self: &Arc<Self>, shutdown: &CancellationToken) -> AgentResult<()> {
        let (settings, tick) = {
            let config = self.config();
            (
                ServerSettings::from(&config.control),
                Duration::from_millis(config.agent.tick_interval_ms),
            )
        };
        let socket = self.socket_path();
        let handler: Arc<dyn ControlHandler> = Arc::clone(self) as Arc<dyn ControlHandler>;
        let server = ControlServer::bind(&socket, settings, handler)?;

        let server_task = tokio::spawn(server.serve(shutdown.clone()));
        let tick_task = self.scheduler.spawn_tick_loop(tick, shutdown.clone());

        info!(
            pid = std::process::id(),
            tasks = self.scheduler.statuses().len(),
            socket = %socket.display(),
            "agent started"
        );

        shutdown.cancelled().await;
        info!("agent shutting down");

        if let Err(e) = tick_task.await {
            error!(error = %e, "tick loop panicked");
        }
        self.scheduler.shutdown(SHUTDOWN_GRACE).await;
        if let Err(e) = server_task.await {
            error!(error = %e, "control server panicked");
        }
        Ok(())
    }

    fn acquire_pid_file(&self) -> AgentResult<()> {
        let own = std::process::id();
        if let Some(pid) = self.paths.read_pid()
            && pid != own
            && pid_is_alive(pid)
        {
            return Err(AgentError::AlreadyRunning { pid });
        }
        atomic_write(&self.paths.pid_file(), format!("{own}\n").as_bytes())?;
        debug!(pid = own, path = %self.paths.pid_file().display(), "wrote pid file");
        Ok(())
    }

    /// Remove the pid file (if it is ours) and the control socket.
    pub fn cleanup(&self) {
        if self.paths.read_pid() == Some(std::process::id()) {
            remove_quietly(&self.paths.pid_file());
        }
        remove_quietly(&self.socket_path());
    }

    /// Re-read configuration, rediscover packages, drop every cached
    /// package and reconcile the task set.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] if the new configuration is invalid;
    /// the running state is left untouched in that case.
    pub fn reload(&self) -> AgentResult<ReloadOutcome> {
        let config = Config::load(self.runtime.home().root())?;

        if package_root(self.runtime.home(), &config) != self.runtime.package_root() {
            warn!("package_root changed; restart the agent to apply it");
        }
        if config.control != self.config().control {
            warn!("control settings changed; restart the agent to apply them");
        }

        let packages = self.runtime.registry().discover().len();
        let invalidated = self.runtime.loader().invalidate_all();
        self.scheduler
            .set_max_failures(config.agent.max_consecutive_failures);
        let tasks = self
            .scheduler
            .reload(config.tasks.iter().map(TaskSpec::from).collect());
        *self.config() = config;

        info!(packages, invalidated, "configuration reloaded");
        Ok(ReloadOutcome {
            packages,
            invalidated,
            tasks,
        })
    }

    /// Snapshot reported by the `status` command.
    #[must_use]
    pub fn snapshot(&self) -> AgentStatus {
        let uptime = self.started.elapsed();
        AgentStatus {
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION"),
            started_at: self.started_at,
            uptime_secs: uptime.as_secs(),
            uptime: self
                .runtime
                .context()
                .formatter()
                .format_seconds(uptime.as_secs_f64()),
            package_root: self.runtime.package_root().to_path_buf(),
            ticks: self.scheduler.tick_count(),
            tasks: self.scheduler.statuses(),
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("paths", &self.paths)
            .field("scheduler", &self.scheduler)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

fn remove_quietly(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove agent file");
    }
}

/// What `reload_config` did.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadOutcome {
    /// Packages found by rediscovery.
    pub packages: usize,
    /// Loader cache entries dropped.
    pub invalidated: usize,
    /// Task reconciliation.
    pub tasks: ReloadSummary,
}

/// Agent state as reported over the control channel.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    /// Agent pid.
    pub pid: u32,
    /// Agent version.
    pub version: &'static str,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Human-readable uptime.
    pub uptime: String,
    /// Package root in use.
    pub package_root: PathBuf,
    /// Scheduler ticks so far.
    pub ticks: u64,
    /// Every task.
    pub tasks: Vec<crate::task::TaskStatus>,
}

fn ok_json<T: Serialize>(value: &T) -> ControlResponse {
    match serde_json::to_value(value) {
        Ok(data) => ControlResponse::ok(data),
        Err(e) => ControlResponse::error(format!("internal_error: {e}")),
    }
}

#[async_trait]
impl ControlHandler for Agent {
    async fn status(&self) -> ControlResponse {
        ok_json(&self.snapshot())
    }

    async fn start_task(&self, task_id: &str) -> ControlResponse {
        match self.scheduler.start_task(task_id) {
            Ok(status) => ok_json(&status),
            Err(e) => task_error(task_id, &e),
        }
    }

    async fn stop_task(&self, task_id: &str) -> ControlResponse {
        match self.scheduler.stop_task(task_id) {
            Ok(status) => ok_json(&status),
            Err(e) => task_error(task_id, &e),
        }
    }

    async fn reload_config(&self) -> ControlResponse {
        let Some(agent) = self.this.upgrade() else {
            return ControlResponse::error(format!("{ERR_RELOAD_FAILED}: agent is shutting down"));
        };
        // Config parsing, rediscovery and package construction block.
        let outcome = match tokio::task::spawn_blocking(move || agent.reload()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "reload thread died");
                return ControlResponse::error(format!("{ERR_RELOAD_FAILED}: {e}"));
            },
        };
        match outcome {
            Ok(outcome) => ok_json(&outcome),
            Err(e) => {
                warn!(error = %e, "reload_config failed");
                ControlResponse::error(format!("{ERR_RELOAD_FAILED}: {e}"))
            },
        }
    }
}

fn task_error(task_id: &str, error: &AgentError) -> ControlResponse {
    match error {
        AgentError::UnknownTask(_) => ControlResponse::error(format!("{ERR_UNKNOWN_TASK}: {task_id}")),
        other => ControlResponse::error(other.to_string()),
    }
}
