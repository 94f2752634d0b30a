//! Package registry.
//!
//! Scans a package root, extracts metadata from each package directory and
//! reconciles the result into the manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use suite_core::{PackageDescription, PackageMetadata};

use crate::catalog::BuiltinCatalog;
use crate::descriptor::{EntryPoint, package_id_of, read_package_dir};
use crate::error::{PackageError, PackageResult};
use crate::loader::{instantiate, validated_meta};
use crate::manifest::{Manifest, ManifestStore};

/// Discovers packages under a root directory.
#[derive(Debug, Clone)]
pub struct PackageRegistry {
    root: PathBuf,
    store: ManifestStore,
    catalog: Arc<BuiltinCatalog>,
}

impl PackageRegistry {
    /// Open the registry over `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::RootMissing`] if `root` is not a directory.
    /// This is the one startup failure allowed to stop the host.
    pub fn open(
        root: impl Into<PathBuf>,
        store: ManifestStore,
        catalog: Arc<BuiltinCatalog>,
    ) -> PackageResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(PackageError::RootMissing { path: root });
        }
        Ok(Self {
            root,
            store,
            catalog,
        })
    }

    /// The package root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The manifest store.
    #[must_use]
    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Current manifest contents (empty on any read failure).
    #[must_use]
    pub fn manifest(&self) -> Manifest {
        self.store.load()
    }

    /// Whether `package_id` is enabled in the manifest.
    #[must_use]
    pub fn is_enabled(&self, package_id: &str) -> bool {
        self.store.load().is_enabled(package_id)
    }

    /// Scan the root and persist the result. See [`discover_described`](Self::discover_described).
    pub fn discover(&self) -> Vec<PackageMetadata> {
        self.discover_described()
            .into_iter()
            .map(PackageDescription::into_metadata)
            .collect()
    }

    /// Scan the root, keeping track of where each entry's metadata came from.
    ///
    /// Directories are visited in name order. A directory whose metadata
    /// cannot be extracted is logged and skipped; the others are unaffected.
    /// The result replaces the manifest's metadata while keeping stored
    /// enabled flags. A failed manifest write is logged, and the list is
    /// returned anyway.
    pub fn discover_described(&self) -> Vec<PackageDescription> {
        let dirs = match self.package_dirs() {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!(error = %e, "failed to scan package root");
                return Vec::new();
            },
        };

        let mut found = Vec::new();
        for dir in dirs {
            match self.describe_dir(&dir) {
                Ok(Some(description)) => {
                    debug!(
                        package_id = %description.metadata().id,
                        source = ?description.source(),
                        "discovered package"
                    );
                    found.push(description);
                },
                Ok(None) => {
                    debug!(path = %dir.display(), "no package metadata, skipping");
                },
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "failed to read package metadata");
                },
            }
        }

        let metas: Vec<PackageMetadata> = found.iter().map(|d| d.metadata().clone()).collect();
        let mut manifest = self.store.load();
        manifest.reconcile(&metas);
        manifest.touch();
        if let Err(e) = self.store.save(&manifest) {
            warn!(error = %e, "failed to persist manifest after discovery");
        }

        info!(count = found.len(), root = %self.root.display(), "discovered packages");
        found
    }

    /// Extract metadata for one package directory.
    ///
    /// Prefers a static descriptor. Without one, a builtin registered under
    /// the directory name is instantiated and its own metadata used.
    ///
    /// # Errors
    ///
    /// Returns an error if a descriptor exists but is invalid, or if the
    /// builtin fallback fails to load or violates the contract.
    pub fn describe_dir(&self, dir: &Path) -> PackageResult<Option<PackageDescription>> {
        if let Some(declared) = read_package_dir(dir)? {
            return Ok(Some(PackageDescription::Declared(declared.meta)));
        }

        let id = package_id_of(dir)?;
        if !self.catalog.contains(&id) {
            return Ok(None);
        }

        let to_error = |e: crate::error::LoadError| PackageError::Descriptor {
            path: dir.to_path_buf(),
            message: e.to_string(),
        };
        let package = instantiate(&self.catalog, &id, dir, &EntryPoint::default()).map_err(to_error)?;
        let meta = validated_meta(&id, package.as_ref()).map_err(to_error)?;
        Ok(Some(PackageDescription::Loaded(meta)))
    }

    /// Set the enabled flag for `package_id`, appending an entry if the id
    /// is unknown. Returns `false` if the manifest could not be written.
    pub fn enable_package(&self, package_id: &str, enabled: bool) -> bool {
        let mut manifest = self.store.load();
        manifest.set_enabled(package_id, enabled);
        manifest.touch();
        match self.store.save(&manifest) {
            Ok(()) => {
                info!(package_id, enabled, "updated package flag");
                true
            },
            Err(e) => {
                warn!(package_id, error = %e, "failed to update package flag");
                false
            },
        }
    }

    fn package_dirs(&self) -> PackageResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| PackageError::Io {
            path: self.root.clone(),
            source,
        })?;

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable package root entry");
                    None
                },
            })
            .filter(|path| path.is_dir())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_none_or(|n| !n.starts_with('.'))
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}
