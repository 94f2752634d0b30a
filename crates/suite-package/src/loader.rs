//! Full package loading with contract validation and a process-lifetime
//! cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use suite_core::{CapabilityContext, FeaturePackage, PackageMetadata};

use crate::catalog::BuiltinCatalog;
use crate::descriptor::{EntryPoint, read_package_dir};
use crate::error::LoadError;
use crate::isolation::contain_panic;
use crate::process::ProcessPackage;

/// A package that passed loading and validation.
pub struct LoadedPackage {
    meta: PackageMetadata,
    dir: PathBuf,
    package: Box<dyn FeaturePackage>,
}

impl LoadedPackage {
    /// Normalized metadata reported by the instantiated package.
    #[must_use]
    pub fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    /// The package directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Call into the package. May panic; callers contain it.
    ///
    /// # Errors
    ///
    /// Whatever the package returns.
    pub fn run(
        &self,
        feature_id: &str,
        args: &Map<String, Value>,
        ctx: &CapabilityContext,
    ) -> anyhow::Result<Value> {
        self.package.run(feature_id, args, ctx)
    }
}

impl std::fmt::Debug for LoadedPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPackage")
            .field("id", &self.meta.id)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

/// Loads packages from a package root and caches them by id.
///
/// A cached handle is trusted for the lifetime of the loader; use
/// [`invalidate`](Self::invalidate) or [`invalidate_all`](Self::invalidate_all)
/// to force a fresh load.
#[derive(Debug)]
pub struct PackageLoader {
    root: PathBuf,
    catalog: Arc<BuiltinCatalog>,
    cache: Mutex<HashMap<String, Arc<LoadedPackage>>>,
}

impl PackageLoader {
    /// Loader over `root` resolving builtin entry points from `catalog`.
    pub fn new(root: impl Into<PathBuf>, catalog: Arc<BuiltinCatalog>) -> Self {
        Self {
            root: root.into(),
            catalog,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The package root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The builtin catalog.
    #[must_use]
    pub fn catalog(&self) -> &BuiltinCatalog {
        &self.catalog
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<LoadedPackage>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load `package_id`, or return the cached handle.
    ///
    /// # Errors
    ///
    /// - [`LoadError::NotFound`] if there is no such package directory.
    /// - [`LoadError::ImportFailure`] if package code fails or panics while
    ///   being instantiated.
    /// - [`LoadError::ContractViolation`] if the package has no usable entry
    ///   point or its metadata is invalid or names a different id.
    pub fn load(&self, package_id: &str) -> Result<Arc<LoadedPackage>, LoadError> {
        if let Some(cached) = self.cache().get(package_id) {
            return Ok(Arc::clone(cached));
        }

        let loaded = Arc::new(self.load_uncached(package_id)?);
        info!(package_id, dir = %loaded.dir.display(), "loaded package");

        // Another caller may have loaded the same id meanwhile; keep the first.
        let mut cache = self.cache();
        let handle = cache
            .entry(package_id.to_string())
            .or_insert_with(|| Arc::clone(&loaded));
        Ok(Arc::clone(handle))
    }

    fn load_uncached(&self, package_id: &str) -> Result<LoadedPackage, LoadError> {
        if !is_plain_id(package_id) {
            return Err(LoadError::NotFound(format!(
                "'{package_id}' is not a valid package id"
            )));
        }
        let dir = self.root.join(package_id);
        if !dir.is_dir() {
            return Err(LoadError::NotFound(format!(
                "no package '{package_id}' under {}",
                self.root.display()
            )));
        }

        let entry = match read_package_dir(&dir) {
            Ok(Some(declared)) => declared.entry,
            Ok(None) if self.catalog.contains(package_id) => EntryPoint::default(),
            Ok(None) => {
                return Err(LoadError::ContractViolation(format!(
                    "package '{package_id}' has no descriptor and no builtin entry point"
                )));
            },
            Err(e) => return Err(LoadError::ContractViolation(e.to_string())),
        };

        let package = instantiate(&self.catalog, package_id, &dir, &entry)?;
        let meta = validated_meta(package_id, package.as_ref())?;

        Ok(LoadedPackage { meta, dir, package })
    }

    /// Whether `package_id` is cached.
    #[must_use]
    pub fn is_cached(&self, package_id: &str) -> bool {
        self.cache().contains_key(package_id)
    }

    /// Drop the cached handle for `package_id`. Returns whether one existed.
    pub fn invalidate(&self, package_id: &str) -> bool {
        let removed = self.cache().remove(package_id).is_some();
        if removed {
            debug!(package_id, "invalidated cached package");
        }
        removed
    }

    /// Drop every cached handle. Returns how many were dropped.
    pub fn invalidate_all(&self) -> usize {
        let mut cache = self.cache();
        let count = cache.len();
        cache.clear();
        debug!(count, "invalidated package cache");
        count
    }
}

/// Ids are single path components that cannot escape the root.
fn is_plain_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && !id.contains(['/', '\\'])
}

/// Instantiate a package from its entry point, containing panics.
pub(crate) fn instantiate(
    catalog: &BuiltinCatalog,
    package_id: &str,
    dir: &Path,
    entry: &EntryPoint,
) -> Result<Box<dyn FeaturePackage>, LoadError> {
    match entry {
        EntryPoint::Builtin { target } => {
            let name = target.as_deref().unwrap_or(package_id);
            let factory = catalog.get(name).ok_or_else(|| {
                LoadError::ContractViolation(format!(
                    "package '{package_id}' names builtin '{name}', which is not registered"
                ))
            })?;
            match contain_panic(|| factory(dir)) {
                Ok(Ok(package)) => Ok(package),
                Ok(Err(e)) => {
                    warn!(package_id, error = ?e, "package factory failed");
                    Err(LoadError::ImportFailure(format!(
                        "package '{package_id}' failed to load: {e}"
                    )))
                },
                Err(panic) => {
                    warn!(package_id, panic = %panic, "package factory panicked");
                    Err(LoadError::ImportFailure(format!(
                        "package '{package_id}' panicked while loading: {panic}"
                    )))
                },
            }
        },
        EntryPoint::Process { command, args } => ProcessPackage::describe(dir, command, args)
            .map(|p| Box::new(p) as Box<dyn FeaturePackage>)
            .map_err(|e| {
                warn!(package_id, error = ?e, "process package failed to describe itself");
                LoadError::ImportFailure(format!("package '{package_id}' failed to load: {e}"))
            }),
    }
}

/// Check the instantiated package's metadata against the contract.
pub(crate) fn validated_meta(
    package_id: &str,
    package: &dyn FeaturePackage,
) -> Result<PackageMetadata, LoadError> {
    let meta = contain_panic(|| package.meta().clone())
        .map_err(|panic| {
            LoadError::ContractViolation(format!(
                "package '{package_id}' panicked while reporting metadata: {panic}"
            ))
        })?
        .normalized();

    if meta.id != package_id {
        return Err(LoadError::ContractViolation(format!(
            "package meta id '{}' does not match directory '{package_id}'",
            meta.id
        )));
    }
    meta.validate().map_err(LoadError::ContractViolation)?;
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use suite_core::ErrorKind;
    use suite_test::{EchoPackage, PackageRootBuilder};

    use super::*;

    fn loader_with(root: &Path, catalog: BuiltinCatalog) -> PackageLoader {
        PackageLoader::new(root, Arc::new(catalog))
    }

    #[test]
    fn test_missing_package_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader_with(tmp.path(), BuiltinCatalog::new());
        let err = loader.load("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_path_like_ids_are_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let loader = loader_with(tmp.path(), BuiltinCatalog::new());
        for id in ["", "..", "../etc", "a/b", ".hidden"] {
            assert_eq!(loader.load(id).unwrap_err().kind(), ErrorKind::NotFound, "{id}");
        }
    }

    #[test]
    fn test_cached_handle_is_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PackageRootBuilder::new(tmp.path())
            .builtin("echo", &[("echo", "Echo")])
            .build();
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let catalog = BuiltinCatalog::new().with("echo", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoPackage::new("echo")))
        });
        let loader = loader_with(&root, catalog);

        let a = loader.load("echo").unwrap();
        let b = loader.load("echo").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        assert!(loader.invalidate("echo"));
        assert!(!loader.is_cached("echo"));
        let c = loader.load("echo").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(builds.load(Ordering::SeqCst), 2);

        assert_eq!(loader.invalidate_all(), 1);
        assert!(!loader.invalidate("echo"));
    }

    #[test]
    fn test_factory_error_is_import_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PackageRootBuilder::new(tmp.path())
            .builtin("broken", &[])
            .build();
        let catalog = BuiltinCatalog::new().with("broken", |_| anyhow::bail!("missing dependency"));
        let err = loader_with(&root, catalog).load("broken").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImportFailure);
        assert!(err.to_string().contains("missing dependency"));
    }

    #[test]
    #[allow(clippy::panic)]
    fn test_factory_panic_is_import_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PackageRootBuilder::new(tmp.path())
            .builtin("explodes", &[])
            .build();
        let catalog = BuiltinCatalog::new().with("explodes", |_| panic!("init bug"));
        let err = loader_with(&root, catalog).load("explodes").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImportFailure);
        assert!(err.to_string().contains("init bug"));
    }

    #[test]
    fn test_meta_id_mismatch_is_contract_violation() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PackageRootBuilder::new(tmp.path())
            .builtin("liar", &[])
            .build();
        let catalog = BuiltinCatalog::new().with("liar", |_| Ok(Box::new(EchoPackage::new("someone_else"))));
        let err = loader_with(&root, catalog).load("liar").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }

    #[test]
    fn test_unregistered_builtin_is_contract_violation() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PackageRootBuilder::new(tmp.path())
            .builtin("orphan", &[("x", "X")])
            .build();
        let err = loader_with(&root, BuiltinCatalog::new()).load("orphan").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }

    #[test]
    fn test_no_descriptor_falls_back_to_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PackageRootBuilder::new(tmp.path()).empty_dir("echo").build();
        let catalog = BuiltinCatalog::new().with("echo", |_| Ok(Box::new(EchoPackage::new("echo"))));
        let loaded = loader_with(&root, catalog).load("echo").unwrap();
        assert!(loaded.meta().has_feature("echo"));
    }

    #[test]
    fn test_bare_directory_is_contract_violation() {
        let tmp = tempfile::tempdir().unwrap();
        let root = PackageRootBuilder::new(tmp.path()).empty_dir("junk").build();
        let err = loader_with(&root, BuiltinCatalog::new()).load("junk").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }
}
