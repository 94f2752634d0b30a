//! Package metadata and the feature package contract.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::CapabilityContext;

/// Version assigned to packages that do not declare one.
pub const DEFAULT_VERSION: &str = "0.0";

/// One named operation within a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    /// Feature id, unique within its package.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
}

impl FeatureDescriptor {
    /// Create a descriptor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Identity and declared features of a package.
///
/// `id` matches the package's on-disk directory name and is stable across
/// discoveries. Read-only once handed to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Stable package id (the directory name).
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Package version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Declared features, in declaration order.
    #[serde(default)]
    pub features: Vec<FeatureDescriptor>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl PackageMetadata {
    /// Metadata with only an id; every other field takes its default.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            version: default_version(),
            features: Vec::new(),
        }
    }

    /// Builder: set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder: set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Builder: append a feature.
    #[must_use]
    pub fn with_feature(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.features.push(FeatureDescriptor::new(id, name));
        self
    }

    /// Fill empty optional fields with their documented defaults.
    ///
    /// An empty name becomes the id, an empty version becomes `"0.0"`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name.clone_from(&self.id);
        }
        if self.version.trim().is_empty() {
            self.version = default_version();
        }
        for feature in &mut self.features {
            if feature.name.trim().is_empty() {
                feature.name.clone_from(&feature.id);
            }
        }
        self
    }

    /// Whether `feature_id` is declared by this package.
    #[must_use]
    pub fn has_feature(&self, feature_id: &str) -> bool {
        self.features.iter().any(|f| f.id == feature_id)
    }

    /// Check the structural invariants: non-empty id, non-empty and unique
    /// feature ids.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("package id must not be empty".into());
        }
        let mut seen = HashSet::new();
        for feature in &self.features {
            if feature.id.trim().is_empty() {
                return Err(format!("package '{}' declares an empty feature id", self.id));
            }
            if !seen.insert(feature.id.as_str()) {
                return Err(format!(
                    "package '{}' declares feature '{}' more than once",
                    self.id, feature.id
                ));
            }
        }
        Ok(())
    }
}

/// Where a piece of package metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    /// Read from a static descriptor file; no package code ran.
    Declared,
    /// Taken from an instantiated package.
    Loaded,
}

/// Package metadata tagged with how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageDescription {
    /// From a static descriptor (`Package.toml` or legacy `meta.json`).
    Declared(PackageMetadata),
    /// From an actually instantiated package.
    Loaded(PackageMetadata),
}

impl PackageDescription {
    /// The metadata regardless of source.
    #[must_use]
    pub fn metadata(&self) -> &PackageMetadata {
        match self {
            Self::Declared(meta) | Self::Loaded(meta) => meta,
        }
    }

    /// Consume into the metadata.
    #[must_use]
    pub fn into_metadata(self) -> PackageMetadata {
        match self {
            Self::Declared(meta) | Self::Loaded(meta) => meta,
        }
    }

    /// How the metadata was obtained.
    #[must_use]
    pub fn source(&self) -> MetadataSource {
        match self {
            Self::Declared(_) => MetadataSource::Declared,
            Self::Loaded(_) => MetadataSource::Loaded,
        }
    }
}

/// The contract every loadable package satisfies.
///
/// `run` may fail in any way, including by panicking; the dispatcher
/// contains both and turns them into failure envelopes. A return value that
/// is not already envelope-shaped is wrapped as successful data.
pub trait FeaturePackage: Send + Sync {
    /// Declared metadata; `meta().id` must equal the package directory name.
    fn meta(&self) -> &PackageMetadata;

    /// Run one declared feature.
    ///
    /// # Errors
    ///
    /// Any error is reported to the caller as an `execution_failure`.
    fn run(
        &self,
        feature_id: &str,
        args: &Map<String, Value>,
        ctx: &CapabilityContext,
    ) -> anyhow::Result<Value>;
}

impl std::fmt::Debug for dyn FeaturePackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturePackage")
            .field("id", &self.meta().id)
            .finish_non_exhaustive()
    }
}
