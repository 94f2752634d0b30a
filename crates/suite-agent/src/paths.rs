//! Agent state file paths.

use std::path::{Path, PathBuf};

use suite_core::SuiteHome;

/// Paths for agent state files under `<home>/agent/`.
#[derive(Debug, Clone)]
pub struct AgentPaths {
    /// Directory for agent files.
    pub base_dir: PathBuf,
}

impl AgentPaths {
    /// Paths for the agent of `home`.
    #[must_use]
    pub fn for_home(home: &SuiteHome) -> Self {
        Self::from_dir(home.agent_dir())
    }

    /// Create paths from an explicit directory.
    pub fn from_dir(path: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: path.into(),
        }
    }

    /// PID file path.
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join("agent.pid")
    }

    /// Default control socket path.
    #[must_use]
    pub fn socket_path(&self) -> PathBuf {
        self.base_dir.join("control.sock")
    }

    /// Status snapshot path (rewritten after every task completion).
    #[must_use]
    pub fn status_file(&self) -> PathBuf {
        self.base_dir.join("status.json")
    }

    /// Control socket to use, honoring a configured override.
    #[must_use]
    pub fn resolve_socket(&self, configured: Option<&Path>) -> PathBuf {
        configured.map_or_else(|| self.socket_path(), Path::to_path_buf)
    }

    /// Pid recorded in the pid file, if any.
    #[must_use]
    pub fn read_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.pid_file())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

/// Whether a process with `pid` is alive.
#[cfg(unix)]
#[must_use]
pub fn pid_is_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks existence and permission.
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(errno) => errno == nix::errno::Errno::EPERM,
    }
}

/// Whether a process with `pid` is alive.
#[cfg(not(unix))]
#[must_use]
pub fn pid_is_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = AgentPaths::for_home(&SuiteHome::from_path("/h"));
        assert_eq!(paths.pid_file(), PathBuf::from("/h/agent/agent.pid"));
        assert_eq!(paths.socket_path(), PathBuf::from("/h/agent/control.sock"));
        assert_eq!(paths.status_file(), PathBuf::from("/h/agent/status.json"));
        assert_eq!(
            paths.resolve_socket(Some(Path::new("/run/s.sock"))),
            PathBuf::from("/run/s.sock")
        );
    }

    #[test]
    fn test_read_pid() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AgentPaths::from_dir(dir.path());
        assert_eq!(paths.read_pid(), None);
        std::fs::write(paths.pid_file(), "4242\n").unwrap();
        assert_eq!(paths.read_pid(), Some(4242));
    }

    #[cfg(unix)]
    #[test]
    fn test_own_pid_is_alive() {
        assert!(pid_is_alive(std::process::id()));
    }
}
