//! Startup: home, configuration, logging, runtime.

use anyhow::{Context, Result};
use tracing::warn;

use suite_agent::{AgentPaths, ControlClient, HostRuntime, default_broker};
use suite_config::Config;
use suite_core::SuiteHome;
use suite_telemetry::prelude::*;

/// Resolved home plus validated configuration.
#[derive(Debug, Clone)]
pub struct Session {
    /// Suite home.
    pub home: SuiteHome,
    /// Effective configuration.
    pub config: Config,
}

impl Session {
    /// Resolve `$SUITE_HOME` (or `~/.suite`), lay it out and load
    /// `config.toml`.
    ///
    /// # Errors
    ///
    /// Fails if the home cannot be resolved or created, or the configuration
    /// is invalid.
    pub fn load() -> Result<Self> {
        let home = SuiteHome::resolve().context("failed to resolve suite home")?;
        Self::load_from(home)
    }

    /// Same as [`Session::load`] for an explicit home.
    ///
    /// # Errors
    ///
    /// See [`Session::load`].
    pub fn load_from(home: SuiteHome) -> Result<Self> {
        home.ensure()
            .with_context(|| format!("failed to create {}", home.root().display()))?;
        let config = Config::load(home.root())?;
        Ok(Self { home, config })
    }

    /// Logging for this session at `level`, in the configured format.
    #[must_use]
    pub fn log_config(&self, level: &str, target: LogTarget) -> LogConfig {
        let format = self.config.host.log_format.parse().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to compact log format");
            LogFormat::Compact
        });
        LogConfig::new(level).with_format(format).with_target(target)
    }

    /// Rolling log files under `<home>/logs` named after `prefix`.
    #[must_use]
    pub fn file_target(&self, prefix: &str) -> LogTarget {
        LogTarget::Both {
            dir: self.home.logs_dir(),
            prefix: prefix.to_string(),
        }
    }

    /// Registry, loader, dispatcher and context over the builtin catalog.
    ///
    /// # Errors
    ///
    /// Fails if the package root is missing. That is fatal at startup.
    pub fn open_runtime(&self) -> Result<HostRuntime> {
        let runtime = HostRuntime::open(
            self.home.clone(),
            &self.config,
            suite_builtins::catalog(),
            default_broker(),
        )?;
        Ok(runtime)
    }

    /// Agent file paths for this home.
    #[must_use]
    pub fn agent_paths(&self) -> AgentPaths {
        AgentPaths::for_home(&self.home)
    }

    /// Client for the agent of this home, carrying the configured token.
    #[must_use]
    pub fn control_client(&self) -> ControlClient {
        let socket = self
            .agent_paths()
            .resolve_socket(self.config.control.socket_path.as_deref());
        ControlClient::new(socket).with_token(self.config.control.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_over_fresh_home() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::load_from(SuiteHome::from_path(dir.path())).unwrap();
        assert!(session.config.tasks.is_empty());

        let runtime = session.open_runtime().unwrap();
        assert_eq!(runtime.package_root(), dir.path().join("packages"));
        assert_eq!(
            session.control_client().socket(),
            dir.path().join("agent").join("control.sock")
        );
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "[host]\nlog_level = \"loud\"\n").unwrap();
        assert!(Session::load_from(SuiteHome::from_path(dir.path())).is_err());
    }

    #[test]
    fn test_log_config_uses_configured_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::load_from(SuiteHome::from_path(dir.path())).unwrap();
        session.config.host.log_format = "json".to_string();
        let lc = session.log_config("debug", LogTarget::Stderr);
        assert_eq!(lc.format, LogFormat::Json);
        assert_eq!(lc.level, "debug");
    }
}
