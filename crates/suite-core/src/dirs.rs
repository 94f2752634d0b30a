//! Directory layout for the suite home.
//!
//! # Layout
//!
//! ```text
//! ~/.suite/                       (SuiteHome, or $SUITE_HOME)
//! ├── config.toml                 (host + agent configuration)
//! ├── config/                     (JSON config store for packages)
//! ├── packages/                   (default package root)
//! ├── manifest.json               (discovered packages + enabled flags)
//! ├── logs/                       (rolling log files)
//! └── agent/                      (pid file, control socket, status snapshot)
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// Global suite home directory (`~/.suite/` or `$SUITE_HOME`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteHome {
    root: PathBuf,
}

impl SuiteHome {
    /// Resolve the home directory.
    ///
    /// Checks `$SUITE_HOME` first, then falls back to `$HOME/.suite/`.
    ///
    /// # Errors
    ///
    /// Returns an error if `$SUITE_HOME` is relative, or if neither
    /// `$SUITE_HOME` nor `$HOME` is set.
    pub fn resolve() -> io::Result<Self> {
        let root = if let Ok(custom) = std::env::var("SUITE_HOME") {
            let p = PathBuf::from(&custom);
            if !p.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "SUITE_HOME must be an absolute path",
                ));
            }
            p
        } else {
            let home = std::env::var("HOME").map_err(|_| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    "neither SUITE_HOME nor HOME environment variable is set",
                )
            })?;
            PathBuf::from(home).join(".suite")
        };

        Ok(Self { root })
    }

    /// Create from an explicit path (useful for testing).
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensure the directory structure exists.
    ///
    /// The agent directory holds the control socket and is restricted to
    /// the owner (`0o700`) on Unix.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation or permission setting fails.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        std::fs::create_dir_all(self.packages_dir())?;
        std::fs::create_dir_all(self.agent_dir())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(self.agent_dir(), std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Root directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the TOML configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Directory backing the JSON config store.
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.root.join("config")
    }

    /// Default package root.
    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// Path to the package manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    /// Logs directory.
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Agent state directory.
    #[must_use]
    pub fn agent_dir(&self) -> PathBuf {
        self.root.join("agent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let home = SuiteHome::from_path("/opt/suite");
        assert_eq!(home.config_path(), PathBuf::from("/opt/suite/config.toml"));
        assert_eq!(home.manifest_path(), PathBuf::from("/opt/suite/manifest.json"));
        assert_eq!(home.packages_dir(), PathBuf::from("/opt/suite/packages"));
        assert_eq!(home.agent_dir(), PathBuf::from("/opt/suite/agent"));
    }

    #[test]
    fn ensure_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let home = SuiteHome::from_path(dir.path().join("home"));
        home.ensure().unwrap();
        assert!(home.config_dir().is_dir());
        assert!(home.logs_dir().is_dir());
        assert!(home.packages_dir().is_dir());
        assert!(home.agent_dir().is_dir());
    }
}
