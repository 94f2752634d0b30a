//! Configuration struct definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Package host settings.
    pub host: HostSection,
    /// Background agent settings.
    pub agent: AgentSection,
    /// Control channel settings.
    pub control: ControlSection,
    /// Scheduled tasks (`[[task]]` tables).
    #[serde(rename = "task")]
    pub tasks: Vec<TaskConfig>,
}

/// `[host]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSection {
    /// Directory scanned for packages. `None` means `<home>/packages`.
    pub package_root: Option<PathBuf>,
    /// Default log level (`trace` .. `error`).
    pub log_level: String,
    /// Log format (`pretty`, `compact`, `json`).
    pub log_format: String,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            package_root: None,
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
        }
    }
}

/// `[agent]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Scheduler tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Consecutive failures after which a task is parked in `failed`.
    pub max_consecutive_failures: u32,
    /// Wall-clock limit for a heavy (worker process) run.
    pub worker_timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            max_consecutive_failures: 3,
            worker_timeout_secs: 300,
        }
    }
}

/// `[control]` section.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSection {
    /// Unix socket path. `None` means `<home>/agent/control.sock`.
    pub socket_path: Option<PathBuf>,
    /// Shared secret required on every request when set.
    pub token: Option<String>,
    /// Per-connection read timeout in milliseconds.
    pub read_timeout_ms: u64,
    /// Largest accepted request frame.
    pub max_frame_bytes: usize,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            socket_path: None,
            token: None,
            read_timeout_ms: 5000,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

// Keep the token out of logs.
impl fmt::Debug for ControlSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSection")
            .field("socket_path", &self.socket_path)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish()
    }
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Unique task identifier.
    pub id: String,
    /// Package that provides the feature.
    pub package: String,
    /// Feature to invoke.
    pub feature: String,
    /// Arguments passed to every run.
    #[serde(default)]
    pub args: Map<String, Value>,
    /// When the task runs.
    #[serde(default)]
    pub schedule: Schedule,
    /// Where the task runs.
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// Task schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Run every `every_secs` seconds, first run on the first tick.
    Interval {
        /// Period in seconds.
        every_secs: u64,
    },
    /// Started once at boot and restarted whenever it is not running.
    Persistent,
    /// Only runs when started over the control channel.
    #[default]
    Manual,
}

/// Execution mode for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// In-process, on a blocking worker thread.
    #[default]
    Light,
    /// In an isolated worker process.
    Heavy,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Light => f.write_str("light"),
            Self::Heavy => f.write_str("heavy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_table_parses() {
        let toml_str = r#"
            [[task]]
            id = "cleanup"
            package = "fs"
            feature = "disk_space"
            args = { path = "/tmp", top_n = 5 }
            schedule = { type = "interval", every_secs = 60 }
            mode = "heavy"

            [[task]]
            id = "watch"
            package = "fs"
            feature = "watch"
            schedule = { type = "persistent" }
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tasks.len(), 2);

        let cleanup = &config.tasks[0];
        assert_eq!(cleanup.schedule, Schedule::Interval { every_secs: 60 });
        assert_eq!(cleanup.mode, ExecutionMode::Heavy);
        assert_eq!(cleanup.args["path"], Value::from("/tmp"));
        assert_eq!(cleanup.args["top_n"], Value::from(5));

        let watch = &config.tasks[1];
        assert_eq!(watch.schedule, Schedule::Persistent);
        assert_eq!(watch.mode, ExecutionMode::Light);
        assert!(watch.args.is_empty());
    }

    #[test]
    fn test_schedule_defaults_to_manual() {
        let config: Config = toml::from_str(
            "[[task]]\nid = \"a\"\npackage = \"p\"\nfeature = \"f\"\n",
        )
        .unwrap();
        assert_eq!(config.tasks[0].schedule, Schedule::Manual);
    }

    #[test]
    fn test_unknown_schedule_type_rejected() {
        let result: Result<Config, _> = toml::from_str(
            "[[task]]\nid = \"a\"\npackage = \"p\"\nfeature = \"f\"\nschedule = { type = \"cron\" }\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_control_debug_redacts_token() {
        let control = ControlSection {
            token: Some("hunter2".to_string()),
            ..ControlSection::default()
        };
        let rendered = format!("{control:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }
}
