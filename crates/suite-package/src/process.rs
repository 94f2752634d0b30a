//! Packages implemented by an external executable.
//!
//! Protocol, with `<cmd>` being the configured command and its arguments:
//!
//! - `<cmd> describe` prints the package metadata as JSON on stdout.
//! - `<cmd> run <feature>` reads the args object as JSON on stdin and prints
//!   its result as JSON on stdout. An empty stdout is a `null` result.
//!
//! A non-zero exit status is a failure; stderr is included in the error.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use serde_json::{Map, Value};

use suite_core::{CapabilityContext, FeaturePackage, PackageMetadata};

/// How often a running child is polled for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How long `<cmd> describe` may take before the load is abandoned.
const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest stderr excerpt carried into an error message.
const STDERR_EXCERPT: usize = 512;

/// A package backed by an executable in its directory.
#[derive(Debug)]
pub struct ProcessPackage {
    meta: PackageMetadata,
    program: PathBuf,
    args: Vec<String>,
    dir: PathBuf,
}

impl ProcessPackage {
    /// Run `<command> describe` in `dir` and build the package from its
    /// answer.
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be spawned, exits non-zero, does not
    /// answer within ten seconds, or prints something that is not package
    /// metadata.
    pub fn describe(dir: &Path, command: &Path, args: &[String]) -> anyhow::Result<Self> {
        Self::describe_within(dir, command, args, DESCRIBE_TIMEOUT)
    }

    /// [`ProcessPackage::describe`] with an explicit time limit.
    ///
    /// # Errors
    ///
    /// As [`ProcessPackage::describe`]; a command still running after
    /// `timeout` is killed and reported.
    pub fn describe_within(
        dir: &Path,
        command: &Path,
        args: &[String],
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let program = resolve_program(dir, command);
        let mut child = Command::new(&program)
            .args(args)
            .arg("describe")
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", program.display()))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let deadline = Instant::now().checked_add(timeout);

        let status = match wait_child(&mut child, deadline, || false)? {
            Waited::Exited(status) => status,
            Waited::Stopped | Waited::TimedOut => bail!(
                "{} describe did not answer within {}ms",
                program.display(),
                timeout.as_millis()
            ),
        };
        let stdout = join(stdout);
        let stderr = join(stderr);

        if !status.success() {
            bail!(
                "{} describe exited with {}: {}",
                program.display(),
                status,
                excerpt(&stderr)
            );
        }

        let meta: PackageMetadata = serde_json::from_slice(&stdout)
            .with_context(|| format!("{} describe printed invalid metadata", program.display()))?;

        Ok(Self {
            meta: meta.normalized(),
            program,
            args: args.to_vec(),
            dir: dir.to_path_buf(),
        })
    }

    fn spawn_run(&self, feature_id: &str) -> anyhow::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .arg("run")
            .arg(feature_id)
            .current_dir(&self.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))
    }
}

impl FeaturePackage for ProcessPackage {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    fn run(
        &self,
        feature_id: &str,
        args: &Map<String, Value>,
        ctx: &CapabilityContext,
    ) -> anyhow::Result<Value> {
        let mut child = self.spawn_run(feature_id)?;

        // Drain both pipes on their own threads so a chatty child never
        // blocks on a full pipe while we wait for it.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // The args go in from a thread of their own: a child that never
        // reads stdin must not keep us from polling for cancellation. Its
        // exit status decides the outcome, not the write.
        if let Some(stdin) = child.stdin.take() {
            feed(stdin, serde_json::to_vec(args)?);
        }

        // After a kill the pipes may still be held open by grandchildren,
        // so the drain threads are only joined once the child exited.
        let status = match wait_child(&mut child, None, || ctx.should_stop())? {
            Waited::Exited(status) => status,
            Waited::Stopped | Waited::TimedOut => {
                ctx.logger().warn(&format!("{} cancelled", self.program.display()));
                bail!("feature '{feature_id}' was stopped before completion");
            },
        };
        let stdout = join(stdout);
        let stderr = join(stderr);

        if !status.success() {
            bail!("process exited with {status}: {}", excerpt(&stderr));
        }

        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&stdout).context("process printed invalid JSON")
    }
}

/// How a watched child ended.
enum Waited {
    Exited(ExitStatus),
    Stopped,
    TimedOut,
}

/// Poll `child` until it exits, `should_stop` turns true, or `deadline`
/// passes. In the last two cases the child is killed and reaped.
fn wait_child(
    child: &mut Child,
    deadline: Option<Instant>,
    should_stop: impl Fn() -> bool,
) -> anyhow::Result<Waited> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Waited::Exited(status));
        }
        let outcome = if should_stop() {
            Some(Waited::Stopped)
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Waited::TimedOut)
        } else {
            None
        };
        if let Some(outcome) = outcome {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(outcome);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Write `payload` to the child's stdin and close it, off the caller's
/// thread.
fn feed(mut stdin: ChildStdin, payload: Vec<u8>) {
    std::thread::spawn(move || {
        let _ = stdin.write_all(&payload);
    });
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn resolve_program(dir: &Path, command: &Path) -> PathBuf {
    let local = dir.join(command);
    if command.is_relative() && local.exists() {
        local
    } else {
        command.to_path_buf()
    }
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    match text.char_indices().nth(STDERR_EXCERPT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
