//! Durable record of discovered packages and their enabled flags.
//!
//! ```json
//! {"updated_at": 1760000000, "packages": [{"id": "fs", ..., "enabled": true}]}
//! ```
//!
//! Every write goes through a temp file in the same directory followed by a
//! rename, so readers see either the old or the new document.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use suite_core::{PackageMetadata, atomic_write_json};

use crate::error::{ManifestError, ManifestResult};

/// One manifest entry: package metadata plus its enabled flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Package metadata.
    #[serde(flatten)]
    pub meta: PackageMetadata,
    /// Whether the package may be dispatched to.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The persisted manifest document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Epoch seconds of the last write; never decreases.
    #[serde(default)]
    pub updated_at: i64,
    /// Entries in discovery order.
    #[serde(default)]
    pub packages: Vec<ManifestEntry>,
}

impl Manifest {
    /// Entry for `id`, if any.
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.packages.iter().find(|e| e.meta.id == id)
    }

    /// Whether `id` is enabled. Unknown ids are enabled.
    #[must_use]
    pub fn is_enabled(&self, id: &str) -> bool {
        self.entry(id).is_none_or(|e| e.enabled)
    }

    /// Set the flag for `id`, appending a bare entry if it is unknown.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) {
        if let Some(entry) = self.packages.iter_mut().find(|e| e.meta.id == id) {
            entry.enabled = enabled;
        } else {
            self.packages.push(ManifestEntry {
                meta: PackageMetadata::new(id),
                enabled,
            });
        }
    }

    /// Replace all metadata with `discovered`, keeping stored flags by id.
    ///
    /// Packages that were not rediscovered are dropped.
    pub fn reconcile(&mut self, discovered: &[PackageMetadata]) {
        let packages = discovered
            .iter()
            .map(|meta| ManifestEntry {
                meta: meta.clone(),
                enabled: self.is_enabled(&meta.id),
            })
            .collect();
        self.packages = packages;
    }

    /// Bump `updated_at` to now, never moving it backwards.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp().max(self.updated_at);
    }
}

/// Reads and atomically writes the manifest file.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The manifest file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest, or an empty one if it is missing, empty or
    /// unreadable. Failures are logged.
    #[must_use]
    pub fn load(&self) -> Manifest {
        match self.try_load() {
            Ok(Some(manifest)) => manifest,
            Ok(None) => Manifest::default(),
            Err(e) => {
                warn!(error = %e, "manifest unreadable, starting from an empty manifest");
                Manifest::default()
            },
        }
    }

    /// Load the manifest, distinguishing "absent" from "broken".
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file exists but cannot be read or
    /// parsed.
    pub fn try_load(&self) -> ManifestResult<Option<Manifest>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ManifestError::Read {
                    path: self.path.clone(),
                    source,
                });
            },
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ManifestError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Atomically replace the manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Write`] if the write or rename fails.
    pub fn save(&self, manifest: &Manifest) -> ManifestResult<()> {
        atomic_write_json(&self.path, manifest)?;
        debug!(
            path = %self.path.display(),
            packages = manifest.packages.len(),
            "saved manifest"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ManifestStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("manifest.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_and_empty_load_as_empty() {
        let (_dir, store) = store();
        assert_eq!(store.load(), Manifest::default());

        std::fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.load(), Manifest::default());
    }

    #[test]
    fn test_corrupt_loads_as_empty() {
        let (_dir, store) = store();
        std::fs::write(store.path(), "{\"packages\": [").unwrap();
        assert!(store.try_load().is_err());
        assert_eq!(store.load(), Manifest::default());
    }

    #[test]
    fn test_save_then_load() {
        let (_dir, store) = store();
        let mut manifest = Manifest::default();
        manifest.reconcile(&[PackageMetadata::new("fs").with_feature("disk_space", "Disk Space")]);
        manifest.set_enabled("fs", false);
        manifest.touch();
        store.save(&manifest).unwrap();

        let loaded = store.load();
        assert_eq!(loaded, manifest);
        assert!(!loaded.is_enabled("fs"));
    }

    #[test]
    fn test_entry_without_enabled_defaults_true() {
        let (_dir, store) = store();
        std::fs::write(
            store.path(),
            r#"{"updated_at": 5, "packages": [{"id": "fs", "name": "fs"}]}"#,
        )
        .unwrap();
        let manifest = store.load();
        assert!(manifest.packages[0].enabled);
        assert_eq!(manifest.packages[0].meta.version, "0.0");
    }

    #[test]
    fn test_reconcile_preserves_flags_and_drops_missing() {
        let mut manifest = Manifest::default();
        manifest.reconcile(&[PackageMetadata::new("a"), PackageMetadata::new("b")]);
        manifest.set_enabled("b", false);

        manifest.reconcile(&[
            PackageMetadata::new("b").with_version("2.0"),
            PackageMetadata::new("c"),
        ]);

        let ids: Vec<_> = manifest.packages.iter().map(|e| e.meta.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert!(!manifest.is_enabled("b"));
        assert!(manifest.is_enabled("c"));
        assert_eq!(manifest.packages[0].meta.version, "2.0");
    }

    #[test]
    fn test_touch_is_monotonic() {
        let mut manifest = Manifest {
            updated_at: i64::MAX,
            packages: Vec::new(),
        };
        manifest.touch();
        assert_eq!(manifest.updated_at, i64::MAX);

        manifest.updated_at = 0;
        manifest.touch();
        assert!(manifest.updated_at > 0);
    }

    #[test]
    fn test_interrupted_write_keeps_prior_manifest() {
        let (dir, store) = store();
        let mut prior = Manifest::default();
        prior.reconcile(&[PackageMetadata::new("fs")]);
        store.save(&prior).unwrap();

        // A writer that died after writing its temp file but before the rename.
        std::fs::write(
            dir.path().join(".manifest.json.abc123.tmp"),
            "{\"updated_at\": 9, \"packages\": [{\"id\": \"half",
        )
        .unwrap();

        assert_eq!(store.load(), prior);
    }
}
