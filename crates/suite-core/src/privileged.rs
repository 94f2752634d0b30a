//! Privileged-operation broker for OS-level service registration.
//!
//! Consumed through the Capability Context. Every operation is best-effort
//! and fallible; callers must never assume success.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use crate::atomic::atomic_write;
use crate::error::{SuiteError, SuiteResult};

/// Service registration and privilege inspection.
pub trait PrivilegedOps: Send + Sync + Debug {
    /// Whether the current process holds administrative privileges.
    fn is_privileged(&self) -> bool;

    /// Register `exe args...` as a service named `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails or is unsupported.
    fn install_service(&self, name: &str, exe: &Path, args: &[String]) -> SuiteResult<()>;

    /// Remove a previously registered service.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails or is unsupported.
    fn uninstall_service(&self, name: &str) -> SuiteResult<()>;

    /// Start a registered service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service could not be started.
    fn start_service(&self, name: &str) -> SuiteResult<()>;

    /// Stop a running service.
    ///
    /// # Errors
    ///
    /// Returns an error if the service could not be stopped.
    fn stop_service(&self, name: &str) -> SuiteResult<()>;
}

/// Broker for hosts without service management support.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBroker;

impl PrivilegedOps for UnavailableBroker {
    fn is_privileged(&self) -> bool {
        false
    }

    fn install_service(&self, name: &str, _exe: &Path, _args: &[String]) -> SuiteResult<()> {
        Err(unsupported("install", name))
    }

    fn uninstall_service(&self, name: &str) -> SuiteResult<()> {
        Err(unsupported("uninstall", name))
    }

    fn start_service(&self, name: &str) -> SuiteResult<()> {
        Err(unsupported("start", name))
    }

    fn stop_service(&self, name: &str) -> SuiteResult<()> {
        Err(unsupported("stop", name))
    }
}

fn unsupported(op: &str, name: &str) -> SuiteError {
    SuiteError::Privileged(format!(
        "cannot {op} service '{name}': service management is unavailable on this host"
    ))
}

/// systemd-backed broker.
///
/// In user mode units go to `~/.config/systemd/user` and `systemctl --user`
/// is used; otherwise units go to `/etc/systemd/system`, which requires root.
#[derive(Debug, Clone)]
pub struct SystemdBroker {
    unit_dir: PathBuf,
    user_mode: bool,
}

impl SystemdBroker {
    /// System-wide broker (units under `/etc/systemd/system`).
    #[must_use]
    pub fn system() -> Self {
        Self {
            unit_dir: PathBuf::from("/etc/systemd/system"),
            user_mode: false,
        }
    }

    /// Per-user broker rooted at `home`.
    #[must_use]
    pub fn user(home: &Path) -> Self {
        Self {
            unit_dir: home.join(".config").join("systemd").join("user"),
            user_mode: true,
        }
    }

    fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(format!("{name}.service"))
    }

    fn systemctl(&self, args: &[&str]) -> SuiteResult<()> {
        let mut cmd = Command::new("systemctl");
        if self.user_mode {
            cmd.arg("--user");
        }
        cmd.args(args);
        let output = cmd
            .output()
            .map_err(|e| SuiteError::Privileged(format!("failed to run systemctl: {e}")))?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(SuiteError::Privileged(format!(
                "systemctl {} failed: {}",
                args.join(" "),
                stderr.trim()
            )))
        }
    }

    fn require_privilege(&self, op: &str, name: &str) -> SuiteResult<()> {
        if !self.user_mode && !self.is_privileged() {
            warn!(service = name, op, "Refusing system service operation without root");
            return Err(SuiteError::Privileged(format!(
                "{op} of system service '{name}' requires root"
            )));
        }
        Ok(())
    }
}

impl PrivilegedOps for SystemdBroker {
    fn is_privileged(&self) -> bool {
        #[cfg(unix)]
        {
            nix::unistd::geteuid().is_root()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    fn install_service(&self, name: &str, exe: &Path, args: &[String]) -> SuiteResult<()> {
        self.require_privilege("install", name)?;
        let mut exec = exe.display().to_string();
        for arg in args {
            exec.push(' ');
            exec.push_str(arg);
        }
        let wanted_by = if self.user_mode {
            "default.target"
        } else {
            "multi-user.target"
        };
        let unit = format!(
            "[Unit]\nDescription=Utility Suite service {name}\n\n\
             [Service]\nExecStart={exec}\nRestart=on-failure\n\n\
             [Install]\nWantedBy={wanted_by}\n"
        );
        atomic_write(&self.unit_path(name), unit.as_bytes())?;
        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", name])?;
        info!(service = name, "Installed service");
        Ok(())
    }

    fn uninstall_service(&self, name: &str) -> SuiteResult<()> {
        self.require_privilege("uninstall", name)?;
        // Disabling a unit that is already gone is not an error worth surfacing.
        if let Err(e) = self.systemctl(&["disable", "--now", name]) {
            warn!(service = name, error = %e, "Disable failed during uninstall");
        }
        let path = self.unit_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(source) => return Err(SuiteError::Io { path, source }),
        }
        self.systemctl(&["daemon-reload"])?;
        info!(service = name, "Uninstalled service");
        Ok(())
    }

    fn start_service(&self, name: &str) -> SuiteResult<()> {
        self.require_privilege("start", name)?;
        self.systemctl(&["start", name])
    }

    fn stop_service(&self, name: &str) -> SuiteResult<()> {
        self.require_privilege("stop", name)?;
        self.systemctl(&["stop", name])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_broker_fails_every_operation() {
        let broker = UnavailableBroker;
        assert!(!broker.is_privileged());
        assert!(broker.install_service("x", Path::new("/bin/true"), &[]).is_err());
        assert!(broker.uninstall_service("x").is_err());
        assert!(broker.start_service("x").is_err());
        assert!(broker.stop_service("x").is_err());
    }

    #[test]
    fn user_broker_places_units_under_home() {
        let broker = SystemdBroker::user(Path::new("/home/u"));
        assert_eq!(
            broker.unit_path("suited"),
            PathBuf::from("/home/u/.config/systemd/user/suited.service")
        );
    }
}
