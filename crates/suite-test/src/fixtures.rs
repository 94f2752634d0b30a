//! Filesystem fixtures: throwaway suite homes and package roots.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use suite_core::{CapabilityContext, ConfigStore, Constants, SuiteHome, UnavailableBroker};

/// A suite home in a temporary directory, removed on drop.
pub struct TestHome {
    _dir: TempDir,
    home: SuiteHome,
}

impl TestHome {
    /// Create and lay out a fresh home.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp home");
        let home = SuiteHome::from_path(dir.path());
        home.ensure().expect("lay out temp home");
        Self { _dir: dir, home }
    }

    /// The home layout.
    #[must_use]
    pub fn home(&self) -> &SuiteHome {
        &self.home
    }

    /// `<home>/packages`.
    #[must_use]
    pub fn packages_dir(&self) -> PathBuf {
        self.home.packages_dir()
    }

    /// A capability context rooted in this home, with no privileged broker.
    #[must_use]
    pub fn context(&self) -> CapabilityContext {
        CapabilityContext::new(
            ConfigStore::new(self.home.config_dir()),
            Arc::new(UnavailableBroker),
            Constants::new(&self.home, self.home.packages_dir()),
        )
    }
}

impl Default for TestHome {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a package root directory tree.
///
/// Each method queues one package directory; [`build`](Self::build) writes
/// them all.
#[derive(Debug)]
pub struct PackageRootBuilder {
    root: PathBuf,
    entries: Vec<(String, Vec<(String, String)>)>,
}

impl PackageRootBuilder {
    /// Start a builder for `root` (created if missing).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
        }
    }

    /// A package with a `Package.toml` whose entry point is the builtin of
    /// the same id.
    #[must_use]
    pub fn builtin(self, id: &str, features: &[(&str, &str)]) -> Self {
        let mut toml = format!("[package]\nid = \"{id}\"\nname = \"{id}\"\n\n[entry]\nkind = \"builtin\"\n");
        for (fid, fname) in features {
            let _ = write!(toml, "\n[[feature]]\nid = \"{fid}\"\nname = \"{fname}\"\n");
        }
        self.file(id, "Package.toml", &toml)
    }

    /// A package with a raw `Package.toml`.
    #[must_use]
    pub fn descriptor(self, id: &str, toml: &str) -> Self {
        self.file(id, "Package.toml", toml)
    }

    /// A package with only a legacy `meta.json`.
    #[must_use]
    pub fn legacy(self, id: &str, json: &str) -> Self {
        self.file(id, "meta.json", json)
    }

    /// A directory with no metadata at all.
    #[must_use]
    pub fn empty_dir(mut self, id: &str) -> Self {
        self.entries.push((id.to_string(), Vec::new()));
        self
    }

    /// An arbitrary file inside package `id`.
    #[must_use]
    pub fn file(mut self, id: &str, name: &str, contents: &str) -> Self {
        if let Some((_, files)) = self.entries.iter_mut().find(|(e, _)| e == id) {
            files.push((name.to_string(), contents.to_string()));
        } else {
            self.entries
                .push((id.to_string(), vec![(name.to_string(), contents.to_string())]));
        }
        self
    }

    /// Write everything to disk and return the root.
    ///
    /// # Panics
    ///
    /// Panics on any I/O error.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> PathBuf {
        std::fs::create_dir_all(&self.root).expect("create package root");
        for (id, files) in &self.entries {
            let dir = self.root.join(id);
            std::fs::create_dir_all(&dir).expect("create package dir");
            for (name, contents) in files {
                write_file(&dir.join(name), contents);
            }
        }
        self.root
    }
}

#[allow(clippy::expect_used)]
fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, contents).expect("write fixture file");
}
