//! Task model.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use suite_config::{ExecutionMode, Schedule, TaskConfig};
use suite_core::Envelope;

/// What to run and when. Immutable between reloads.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    /// Unique task id.
    pub task_id: String,
    /// Target package.
    pub package_id: String,
    /// Target feature.
    pub feature_id: String,
    /// Arguments for every run.
    pub args: Map<String, Value>,
    /// Trigger.
    pub schedule: Schedule,
    /// Light (thread) or heavy (worker process).
    pub mode: ExecutionMode,
}

impl From<&TaskConfig> for TaskSpec {
    fn from(config: &TaskConfig) -> Self {
        Self {
            task_id: config.id.clone(),
            package_id: config.package.clone(),
            feature_id: config.feature.clone(),
            args: config.args.clone(),
            schedule: config.schedule,
            mode: config.mode,
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for its next trigger.
    Idle,
    /// An execution is in flight.
    Running,
    /// Stopped by an operator; only `start_task` brings it back.
    Stopped,
    /// Failed too many times in a row; excluded from scheduling.
    Failed,
}

/// One in-flight execution.
#[derive(Debug, Clone)]
pub(crate) struct ActiveRun {
    pub(crate) run_id: Uuid,
    pub(crate) cancel: CancellationToken,
}

/// Outcome of the latest finished execution.
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    /// Execution id.
    pub run_id: Uuid,
    /// When it finished.
    pub finished_at: DateTime<Utc>,
    /// Whether it succeeded.
    pub success: bool,
    /// Envelope message, if any.
    pub message: Option<String>,
}

/// Scheduler-owned mutable state of a task.
#[derive(Debug)]
pub(crate) struct TaskRecord {
    pub(crate) spec: TaskSpec,
    pub(crate) state: TaskState,
    pub(crate) runs: u64,
    pub(crate) consecutive_failures: u32,
    /// `None` means due on the next tick.
    pub(crate) next_due: Option<Instant>,
    /// Set by `start_task`; runs once regardless of schedule.
    pub(crate) forced: bool,
    pub(crate) active: Option<ActiveRun>,
    pub(crate) last_run: Option<LastRun>,
}

impl TaskRecord {
    pub(crate) fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            state: TaskState::Idle,
            runs: 0,
            consecutive_failures: 0,
            next_due: None,
            forced: false,
            active: None,
            last_run: None,
        }
    }

    /// Whether a tick at `now` should start this task.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        if self.state != TaskState::Idle || self.active.is_some() {
            return false;
        }
        if self.forced {
            return true;
        }
        match self.spec.schedule {
            Schedule::Interval { .. } => self.next_due.is_none_or(|due| due <= now),
            Schedule::Persistent => true,
            Schedule::Manual => false,
        }
    }

    /// Mark the task `Running` under a fresh execution id.
    pub(crate) fn begin(&mut self) -> ActiveRun {
        let run = ActiveRun {
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
        };
        self.state = TaskState::Running;
        self.runs = self.runs.saturating_add(1);
        self.forced = false;
        self.active = Some(run.clone());
        run
    }

    /// Record a finished execution and pick the next state.
    ///
    /// Only the current execution may settle the record. Returns `false`,
    /// leaving the record untouched, when `run_id` is not the active run.
    pub(crate) fn finish(&mut self, run_id: Uuid, envelope: &Envelope, max_failures: u32) -> bool {
        if self.active.as_ref().is_none_or(|a| a.run_id != run_id) {
            return false;
        }
        self.active = None;
        self.last_run = Some(LastRun {
            run_id,
            finished_at: Utc::now(),
            success: envelope.success,
            message: envelope.message.clone(),
        });

        if let Schedule::Interval { every_secs } = self.spec.schedule {
            self.next_due = Instant::now().checked_add(Duration::from_secs(every_secs));
        }

        // A stop that arrived mid-run wins over the outcome.
        if self.state != TaskState::Running {
            return true;
        }
        if envelope.success {
            self.consecutive_failures = 0;
            self.state = TaskState::Idle;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            self.state = if self.consecutive_failures >= max_failures {
                TaskState::Failed
            } else {
                TaskState::Idle
            };
        }
        true
    }

    pub(crate) fn status(&self) -> TaskStatus {
        TaskStatus {
            task_id: self.spec.task_id.clone(),
            package_id: self.spec.package_id.clone(),
            feature_id: self.spec.feature_id.clone(),
            mode: self.spec.mode,
            state: self.state,
            runs: self.runs,
            consecutive_failures: self.consecutive_failures,
            last_run: self.last_run.clone(),
        }
    }
}

/// Serializable view of a task, as reported by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    /// Task id.
    pub task_id: String,
    /// Target package.
    pub package_id: String,
    /// Target feature.
    pub feature_id: String,
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Current state.
    pub state: TaskState,
    /// Executions started since the agent came up.
    pub runs: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Latest finished execution.
    pub last_run: Option<LastRun>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(schedule: Schedule) -> TaskSpec {
        TaskSpec {
            task_id: "t".into(),
            package_id: "p".into(),
            feature_id: "f".into(),
            args: Map::new(),
            schedule,
            mode: ExecutionMode::Light,
        }
    }

    #[test]
    fn test_due_rules() {
        let now = Instant::now();
        assert!(TaskRecord::new(spec(Schedule::Interval { every_secs: 60 })).is_due(now));
        assert!(TaskRecord::new(spec(Schedule::Persistent)).is_due(now));
        assert!(!TaskRecord::new(spec(Schedule::Manual)).is_due(now));

        let mut forced = TaskRecord::new(spec(Schedule::Manual));
        forced.forced = true;
        assert!(forced.is_due(now));

        let mut stopped = TaskRecord::new(spec(Schedule::Persistent));
        stopped.state = TaskState::Stopped;
        assert!(!stopped.is_due(now));
    }

    #[test]
    fn test_interval_waits_after_run() {
        let mut record = TaskRecord::new(spec(Schedule::Interval { every_secs: 3600 }));
        let run = record.begin();
        assert!(record.finish(run.run_id, &Envelope::success(None), 3));
        assert_eq!(record.state, TaskState::Idle);
        assert!(!record.is_due(Instant::now()));
    }

    #[test]
    fn test_failures_park_task() {
        let mut record = TaskRecord::new(spec(Schedule::Persistent));
        for expected in [TaskState::Idle, TaskState::Failed] {
            let run = record.begin();
            record.finish(run.run_id, &Envelope::failure("execution_failure: x"), 2);
            assert_eq!(record.state, expected);
        }
        assert_eq!(record.consecutive_failures, 2);
        assert!(!record.is_due(Instant::now()));
    }

    #[test]
    fn test_success_resets_failures() {
        let mut record = TaskRecord::new(spec(Schedule::Persistent));
        let run = record.begin();
        record.finish(run.run_id, &Envelope::failure("boom"), 3);
        let run = record.begin();
        record.finish(run.run_id, &Envelope::success(None), 3);
        assert_eq!(record.consecutive_failures, 0);
        assert_eq!(record.last_run.as_ref().map(|r| r.success), Some(true));
    }

    #[test]
    fn test_stop_during_run_is_kept() {
        let mut record = TaskRecord::new(spec(Schedule::Persistent));
        let run = record.begin();
        record.state = TaskState::Stopped;
        assert!(record.finish(run.run_id, &Envelope::success(None), 3));
        assert_eq!(record.state, TaskState::Stopped);
        assert!(record.active.is_none());
    }

    #[test]
    fn test_stale_run_is_ignored() {
        let mut record = TaskRecord::new(spec(Schedule::Persistent));
        let current = record.begin();

        assert!(!record.finish(Uuid::new_v4(), &Envelope::failure("stopped"), 1));
        assert_eq!(record.state, TaskState::Running);
        assert_eq!(record.consecutive_failures, 0);
        assert!(record.last_run.is_none());
        assert!(record.active.as_ref().is_some_and(|a| a.run_id == current.run_id));
    }
}
