//! Disk and file utilities.

mod disk_space;

use serde_json::{Map, Value};

use suite_core::prelude::*;

/// Package id and builtin factory name.
pub const PACKAGE_ID: &str = "filesystem";

/// The `filesystem` package.
#[derive(Debug)]
pub struct FilesystemPackage {
    meta: PackageMetadata,
}

impl FilesystemPackage {
    /// Create the package.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meta: PackageMetadata::new(PACKAGE_ID)
                .with_name("Filesystem Tools")
                .with_description("Disk and file utilities")
                .with_version("0.1")
                .with_feature(disk_space::FEATURE_ID, "Disk Space Visualizer"),
        }
    }
}

impl Default for FilesystemPackage {
    fn default() -> Self {
        Self::new()
    }
}

impl FeaturePackage for FilesystemPackage {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    fn run(
        &self,
        feature_id: &str,
        args: &Map<String, Value>,
        ctx: &CapabilityContext,
    ) -> anyhow::Result<Value> {
        match feature_id {
            disk_space::FEATURE_ID => disk_space::run(args, ctx),
            other => anyhow::bail!("filesystem has no feature '{other}'"),
        }
    }
}
