//! Task scheduler.
//!
//! Owns the live task set and drives every state transition. A tick starts
//! each due task on its execution unit; a task whose previous execution is
//! still in flight is skipped, never queued.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use suite_core::{Envelope, atomic_write_json};

use crate::error::{AgentError, AgentResult};
use crate::task::{ActiveRun, TaskRecord, TaskSpec, TaskState, TaskStatus};
use crate::unit::ExecutionUnits;

/// What a reload changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReloadSummary {
    /// Newly configured task ids.
    pub added: Vec<String>,
    /// Task ids no longer configured (stopped and dropped).
    pub removed: Vec<String>,
    /// Task ids whose definition changed.
    pub updated: Vec<String>,
}

/// Drives tasks through their lifecycle.
pub struct Scheduler {
    tasks: Mutex<BTreeMap<String, TaskRecord>>,
    units: ExecutionUnits,
    max_failures: AtomicU32,
    status_file: Option<PathBuf>,
    ticks: AtomicU64,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Scheduler over `specs`, all starting `Idle`.
    ///
    /// `status_file`, when set, receives a snapshot after every completion
    /// and every operator action.
    #[must_use]
    pub fn new(
        specs: Vec<TaskSpec>,
        units: ExecutionUnits,
        max_failures: u32,
        status_file: Option<PathBuf>,
    ) -> Arc<Self> {
        let tasks = specs
            .into_iter()
            .map(|spec| (spec.task_id.clone(), TaskRecord::new(spec)))
            .collect();
        Arc::new(Self {
            tasks: Mutex::new(tasks),
            units,
            max_failures: AtomicU32::new(max_failures.max(1)),
            status_file,
            ticks: AtomicU64::new(0),
            inflight: Mutex::new(Vec::new()),
        })
    }

    fn tasks(&self) -> MutexGuard<'_, BTreeMap<String, TaskRecord>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inflight(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the failure threshold (applies from the next completion).
    pub fn set_max_failures(&self, max_failures: u32) {
        self.max_failures.store(max_failures.max(1), Ordering::Relaxed);
    }

    /// Ticks processed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Start every due task. Returns how many were started.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn tick(self: &Arc<Self>) -> usize {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.launch(None)
    }

    fn launch(self: &Arc<Self>, only: Option<&str>) -> usize {
        let now = Instant::now();
        let mut started = Vec::new();
        {
            let mut tasks = self.tasks();
            for (id, record) in tasks.iter_mut() {
                if only.is_some_and(|o| o != id.as_str()) {
                    continue;
                }
                if !record.is_due(now) {
                    if record.active.is_some() && only.is_none() {
                        debug!(task_id = %id, "previous run still active, skipping tick");
                    }
                    continue;
                }
                let run = record.begin();
                started.push((record.spec.clone(), run));
            }
        }

        let count = started.len();
        for (spec, run) in started {
            self.spawn_run(spec, run);
        }
        count
    }

    fn spawn_run(self: &Arc<Self>, spec: TaskSpec, run: ActiveRun) {
        let unit = self.units.for_mode(spec.mode);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!(
                task_id = %spec.task_id,
                run_id = %run.run_id,
                mode = %spec.mode,
                "task started"
            );
            let envelope = unit.execute(&spec, run.cancel.clone()).await;
            this.complete(&spec.task_id, run.run_id, &envelope);
        });

        let mut inflight = self.inflight();
        inflight.retain(|h| !h.is_finished());
        inflight.push(handle);
    }

    fn complete(&self, task_id: &str, run_id: Uuid, envelope: &Envelope) {
        let max_failures = self.max_failures.load(Ordering::Relaxed);
        {
            let mut tasks = self.tasks();
            let Some(record) = tasks.get_mut(task_id) else {
                debug!(task_id, %run_id, "run finished for a task that was removed");
                return;
            };
            if !record.finish(run_id, envelope, max_failures) {
                debug!(task_id, %run_id, "ignoring result of a superseded run");
                return;
            }

            match record.state {
                TaskState::Failed => error!(
                    task_id,
                    %run_id,
                    failures = record.consecutive_failures,
                    message = ?envelope.message,
                    "task failed repeatedly, excluding it from scheduling"
                ),
                _ if envelope.success => info!(task_id, %run_id, "task finished"),
                _ => warn!(task_id, %run_id, message = ?envelope.message, "task run failed"),
            }
        }
        self.write_snapshot();
    }

    /// Clear a `Stopped`/`Failed` task and run it now.
    ///
    /// A task whose previous run is still winding down starts on the first
    /// tick after that run finishes.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnknownTask`] if no such task exists.
    pub fn start_task(self: &Arc<Self>, task_id: &str) -> AgentResult<TaskStatus> {
        {
            let mut tasks = self.tasks();
            let record = tasks
                .get_mut(task_id)
                .ok_or_else(|| AgentError::UnknownTask(task_id.to_string()))?;
            if matches!(record.state, TaskState::Stopped | TaskState::Failed) {
                record.state = TaskState::Idle;
                record.consecutive_failures = 0;
            }
            if record.state == TaskState::Idle {
                record.forced = true;
            }
        }
        self.launch(Some(task_id));
        info!(task_id, "task start requested");
        self.write_snapshot();
        self.task_status(task_id)
            .ok_or_else(|| AgentError::UnknownTask(task_id.to_string()))
    }

    /// Stop a task: no further runs are dispatched, and an in-flight run is
    /// asked to stop.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnknownTask`] if no such task exists.
    pub fn stop_task(&self, task_id: &str) -> AgentResult<TaskStatus> {
        let status = {
            let mut tasks = self.tasks();
            let record = tasks
                .get_mut(task_id)
                .ok_or_else(|| AgentError::UnknownTask(task_id.to_string()))?;
            record.state = TaskState::Stopped;
            record.forced = false;
            if let Some(active) = &record.active {
                active.cancel.cancel();
            }
            record.status()
        };
        info!(task_id, "task stopped");
        self.write_snapshot();
        Ok(status)
    }

    /// Reconcile the live task set with `specs`.
    ///
    /// New tasks start `Idle`; removed tasks are stopped and dropped; changed
    /// tasks keep their counters and pick up the new definition on the next
    /// tick. `Failed` tasks are cleared back to `Idle`.
    pub fn reload(&self, specs: Vec<TaskSpec>) -> ReloadSummary {
        let mut summary = ReloadSummary::default();
        {
            let mut tasks = self.tasks();
            let mut incoming: BTreeMap<String, TaskSpec> = specs
                .into_iter()
                .map(|s| (s.task_id.clone(), s))
                .collect();

            tasks.retain(|id, record| {
                if incoming.contains_key(id) {
                    return true;
                }
                if let Some(active) = &record.active {
                    active.cancel.cancel();
                }
                summary.removed.push(id.clone());
                false
            });

            for (id, record) in tasks.iter_mut() {
                let Some(spec) = incoming.remove(id) else {
                    continue;
                };
                if record.spec != spec {
                    if record.spec.schedule != spec.schedule {
                        record.next_due = None;
                    }
                    record.spec = spec;
                    summary.updated.push(id.clone());
                }
                if record.state == TaskState::Failed {
                    record.state = TaskState::Idle;
                    record.consecutive_failures = 0;
                }
            }

            for (id, spec) in incoming {
                summary.added.push(id.clone());
                tasks.insert(id, TaskRecord::new(spec));
            }
        }

        info!(
            added = summary.added.len(),
            removed = summary.removed.len(),
            updated = summary.updated.len(),
            "reconciled tasks"
        );
        self.write_snapshot();
        summary
    }

    /// Status of every task, ordered by id.
    #[must_use]
    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.tasks().values().map(TaskRecord::status).collect()
    }

    /// Status of one task.
    #[must_use]
    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks().get(task_id).map(TaskRecord::status)
    }

    fn write_snapshot(&self) {
        let Some(path) = &self.status_file else {
            return;
        };
        let snapshot = json!({
            "updated_at": chrono::Utc::now(),
            "ticks": self.tick_count(),
            "tasks": self.statuses(),
        });
        if let Err(e) = atomic_write_json(path, &snapshot) {
            warn!(path = %path.display(), error = %e, "failed to write status snapshot");
        }
    }

    /// Spawn the periodic tick loop. Stops when `shutdown` is cancelled.
    ///
    /// Ticks that fall behind are skipped, not replayed.
    #[must_use]
    pub fn spawn_tick_loop(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        this.tick();
                    },
                }
            }
            debug!("tick loop stopped");
        })
    }

    /// Ask every in-flight run to stop and wait up to `grace` for them.
    pub async fn shutdown(&self, grace: Duration) {
        for record in self.tasks().values() {
            if let Some(active) = &record.active {
                active.cancel.cancel();
            }
        }
        let handles: Vec<JoinHandle<()>> = self.inflight().drain(..).collect();
        let pending = handles.len();
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(pending, "task runs still active after shutdown grace period");
        }
        self.write_snapshot();
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks().len())
            .field("ticks", &self.tick_count())
            .finish_non_exhaustive()
    }
}
