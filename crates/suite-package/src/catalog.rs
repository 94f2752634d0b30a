//! Builtin package factories compiled into the host.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use suite_core::FeaturePackage;

/// Builds a package instance. Receives the package directory.
pub type PackageFactory =
    Arc<dyn Fn(&Path) -> anyhow::Result<Box<dyn FeaturePackage>> + Send + Sync>;

/// Named builtin factories, referenced by `[entry] kind = "builtin"`.
#[derive(Clone, Default)]
pub struct BuiltinCatalog {
    factories: BTreeMap<String, PackageFactory>,
}

impl BuiltinCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Path) -> anyhow::Result<Box<dyn FeaturePackage>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Path) -> anyhow::Result<Box<dyn FeaturePackage>> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    /// The factory registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PackageFactory> {
        self.factories.get(name)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for BuiltinCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinCatalog")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
