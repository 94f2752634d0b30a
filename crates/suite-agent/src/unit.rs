//! Execution units: where a task run actually happens.
//!
//! The scheduler only sees [`ExecutionUnit`]. Light tasks go to
//! [`InProcessUnit`] (a blocking worker thread inside the agent), heavy tasks
//! to [`WorkerProcessUnit`] (a separate `suited worker` process, so a crash
//! cannot take the agent down).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use suite_config::ExecutionMode;
use suite_core::{CapabilityContext, DispatchError, Envelope};
use suite_package::Dispatcher;

use crate::task::TaskSpec;

/// Runs one task execution to completion.
///
/// Implementations never fail outright: every outcome, including a crash of
/// the unit itself, comes back as an [`Envelope`].
#[async_trait]
pub trait ExecutionUnit: Send + Sync {
    /// Execute `spec` once. `cancel` is triggered by `stop_task`.
    async fn execute(&self, spec: &TaskSpec, cancel: CancellationToken) -> Envelope;
}

/// Runs the dispatch on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct InProcessUnit {
    dispatcher: Dispatcher,
    ctx: CapabilityContext,
}

impl InProcessUnit {
    /// Unit dispatching through `dispatcher` with `ctx`.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, ctx: CapabilityContext) -> Self {
        Self { dispatcher, ctx }
    }
}

#[async_trait]
impl ExecutionUnit for InProcessUnit {
    async fn execute(&self, spec: &TaskSpec, cancel: CancellationToken) -> Envelope {
        let dispatcher = self.dispatcher.clone();
        let ctx = self.ctx.with_cancellation(cancel);
        let spec = spec.clone();

        let joined = tokio::task::spawn_blocking(move || {
            dispatcher.dispatch(
                &spec.package_id,
                &spec.feature_id,
                Value::Object(spec.args),
                &ctx,
            )
        })
        .await;

        joined.unwrap_or_else(|e| {
            warn!(error = %e, "in-process worker thread died");
            DispatchError::execution_failure(format!("worker thread died: {e}")).into_envelope()
        })
    }
}

/// Runs the dispatch in a child process and reads its envelope from stdout.
///
/// The child is `<program> <prefix...> --package P --feature F` with the
/// args object on stdin. It is killed on cancellation or timeout.
#[derive(Debug, Clone)]
pub struct WorkerProcessUnit {
    program: PathBuf,
    prefix: Vec<String>,
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl WorkerProcessUnit {
    /// Unit spawning `program prefix...`.
    pub fn new(program: impl Into<PathBuf>, prefix: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            prefix,
            envs: Vec::new(),
            timeout,
        }
    }

    /// Builder: add an environment variable for the child.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    async fn run_child(&self, spec: &TaskSpec, cancel: &CancellationToken) -> Result<Envelope, String> {
        let mut child = Command::new(&self.program)
            .args(&self.prefix)
            .arg("--package")
            .arg(&spec.package_id)
            .arg("--feature")
            .arg(&spec.feature_id)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn worker {}: {e}", self.program.display()))?;

        let payload = serde_json::to_vec(&spec.args).map_err(|e| e.to_string())?;
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return;
            };
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "worker closed stdin early");
            }
        };

        // The stdin feed runs alongside `wait_with_output`, so a worker that
        // never drains its input still observes cancellation and timeout.
        // Dropping the joined future kills the process via `kill_on_drop`.
        let run = async {
            let ((), out) = tokio::join!(feed, child.wait_with_output());
            out
        };
        let output = tokio::select! {
            out = run => out.map_err(|e| format!("worker I/O failed: {e}"))?,
            () = cancel.cancelled() => {
                return Err(format!("task '{}' was stopped", spec.task_id));
            },
            () = tokio::time::sleep(self.timeout) => {
                return Err(format!(
                    "worker timed out after {}s",
                    self.timeout.as_secs()
                ));
            },
        };

        if !output.status.success() && output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("worker exited with {}: {}", output.status, stderr.trim()));
        }
        serde_json::from_slice::<Envelope>(&output.stdout)
            .map_err(|e| format!("worker printed an invalid envelope: {e}"))
    }
}

#[async_trait]
impl ExecutionUnit for WorkerProcessUnit {
    async fn execute(&self, spec: &TaskSpec, cancel: CancellationToken) -> Envelope {
        match self.run_child(spec, &cancel).await {
            Ok(envelope) => envelope,
            Err(message) => {
                warn!(task_id = %spec.task_id, error = %message, "worker process failed");
                DispatchError::execution_failure(message).into_envelope()
            },
        }
    }
}

/// The unit for each execution mode.
#[derive(Clone)]
pub struct ExecutionUnits {
    light: Arc<dyn ExecutionUnit>,
    heavy: Arc<dyn ExecutionUnit>,
}

impl ExecutionUnits {
    /// Units for light and heavy tasks.
    #[must_use]
    pub fn new(light: Arc<dyn ExecutionUnit>, heavy: Arc<dyn ExecutionUnit>) -> Self {
        Self { light, heavy }
    }

    /// The same unit for both modes.
    #[must_use]
    pub fn uniform(unit: Arc<dyn ExecutionUnit>) -> Self {
        Self {
            light: Arc::clone(&unit),
            heavy: unit,
        }
    }

    /// Unit for `mode`.
    #[must_use]
    pub fn for_mode(&self, mode: ExecutionMode) -> Arc<dyn ExecutionUnit> {
        match mode {
            ExecutionMode::Light => Arc::clone(&self.light),
            ExecutionMode::Heavy => Arc::clone(&self.heavy),
        }
    }
}

impl std::fmt::Debug for ExecutionUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionUnits").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::{Map, json};
    use suite_config::Schedule;
    use suite_package::{BuiltinCatalog, PackageLoader};
    use suite_test::{EchoPackage, PackageRootBuilder, SlowPackage, TestHome};

    use super::*;

    fn spec(package: &str, feature: &str) -> TaskSpec {
        let mut args = Map::new();
        args.insert("n".into(), json!(1));
        TaskSpec {
            task_id: "t".into(),
            package_id: package.into(),
            feature_id: feature.into(),
            args,
            schedule: Schedule::Manual,
            mode: ExecutionMode::Light,
        }
    }

    #[tokio::test]
    async fn test_in_process_dispatch() {
        let home = TestHome::new();
        PackageRootBuilder::new(home.packages_dir())
            .builtin("echo", &[("echo", "Echo")])
            .build();
        let catalog = BuiltinCatalog::new().with("echo", |_| Ok(Box::new(EchoPackage::new("echo"))));
        let loader = Arc::new(PackageLoader::new(home.packages_dir(), Arc::new(catalog)));
        let unit = InProcessUnit::new(Dispatcher::without_manifest(loader), home.context());

        let env = unit.execute(&spec("echo", "echo"), CancellationToken::new()).await;
        assert!(env.success);
        assert_eq!(env.data, Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_in_process_cancellation_reaches_package() {
        let home = TestHome::new();
        PackageRootBuilder::new(home.packages_dir())
            .builtin("slow", &[("wait", "Wait")])
            .build();
        let slow = SlowPackage::new("slow", Duration::from_secs(30));
        let runs = slow.runs();
        let slot = std::sync::Mutex::new(Some(slow));
        let catalog = BuiltinCatalog::new().with("slow", move |_| {
            let pkg = slot.lock().unwrap().take();
            pkg.map(|p| Box::new(p) as Box<dyn suite_core::FeaturePackage>)
                .ok_or_else(|| anyhow::anyhow!("already built"))
        });
        let loader = Arc::new(PackageLoader::new(home.packages_dir(), Arc::new(catalog)));
        let unit = InProcessUnit::new(Dispatcher::without_manifest(loader), home.context());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let env = tokio::time::timeout(
            Duration::from_secs(5),
            unit.execute(&spec("slow", "wait"), cancel),
        )
        .await
        .unwrap();
        assert!(!env.success);
        assert_eq!(env.message.as_deref(), Some("stopped"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_process_envelope() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("worker.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\ncat > /dev/null\necho '{\"success\": true, \"data\": \"'\"$2\"'\", \"message\": null}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let unit = WorkerProcessUnit::new(&script, Vec::new(), Duration::from_secs(5));
        let env = unit.execute(&spec("fs", "disk_space"), CancellationToken::new()).await;
        assert!(env.success, "{:?}", env.message);
        assert_eq!(env.data, Some(json!("fs")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_process_timeout_is_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("hang.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let unit = WorkerProcessUnit::new(&script, Vec::new(), Duration::from_millis(100));
        let env = unit.execute(&spec("fs", "disk_space"), CancellationToken::new()).await;
        assert!(!env.success);
        assert!(env.message.unwrap().contains("timed out"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_ignoring_large_input_still_stops() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stuck.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut big = spec("fs", "disk_space");
        big.args.insert("blob".into(), json!("x".repeat(1024 * 1024)));

        // Timeout path.
        let unit = WorkerProcessUnit::new(&script, Vec::new(), Duration::from_millis(100));
        let env = tokio::time::timeout(
            Duration::from_secs(5),
            unit.execute(&big, CancellationToken::new()),
        )
        .await
        .unwrap();
        assert!(!env.success);
        assert!(env.message.unwrap().contains("timed out"));

        // Cancellation path.
        let unit = WorkerProcessUnit::new(&script, Vec::new(), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let env = tokio::time::timeout(Duration::from_secs(5), unit.execute(&big, cancel))
            .await
            .unwrap();
        assert!(!env.success);
        assert!(env.message.unwrap().contains("was stopped"));
    }

    #[tokio::test]
    async fn test_missing_worker_binary_is_failure() {
        let unit = WorkerProcessUnit::new("/no/such/suited", Vec::new(), Duration::from_secs(1));
        let env = unit.execute(&spec("fs", "disk_space"), CancellationToken::new()).await;
        assert!(!env.success);
        assert!(env.message.unwrap().starts_with("execution_failure:"));
    }
}
