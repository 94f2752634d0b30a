//! Static package descriptors.
//!
//! A package directory may declare its metadata without any code running:
//!
//! ```toml
//! [package]
//! id = "filesystem"          # optional, must equal the directory name
//! name = "File System"
//! description = "Disk usage and file helpers"
//! version = "1.2"
//!
//! [entry]
//! kind = "builtin"           # or "process"
//! target = "filesystem"      # builtin factory name, defaults to the id
//!
//! [[feature]]
//! id = "disk_space"
//! name = "Disk Space"
//! ```
//!
//! A legacy `meta.json` holding only `name`, `description` and `version` is
//! accepted as well; it declares no features.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use suite_core::{FeatureDescriptor, PackageMetadata};

use crate::error::{PackageError, PackageResult};

/// Descriptor file name inside a package directory.
pub const DESCRIPTOR_FILE_NAME: &str = "Package.toml";

/// Legacy metadata file name.
pub const LEGACY_META_FILE_NAME: &str = "meta.json";

/// Parsed `Package.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageDescriptor {
    /// `[package]` table.
    #[serde(default)]
    pub package: PackageSection,
    /// `[entry]` table.
    #[serde(default)]
    pub entry: EntryPoint,
    /// `[[feature]]` tables.
    #[serde(default, rename = "feature")]
    pub features: Vec<FeatureDescriptor>,
}

/// `[package]` table of a descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageSection {
    /// Optional explicit id.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Version.
    pub version: String,
}

/// How to instantiate a package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryPoint {
    /// A factory compiled into the host.
    Builtin {
        /// Factory name; defaults to the package id.
        #[serde(default)]
        target: Option<String>,
    },
    /// An external executable speaking the describe/run protocol.
    Process {
        /// Executable, relative to the package directory or on `PATH`.
        command: PathBuf,
        /// Arguments placed before `describe` / `run <feature>`.
        #[serde(default)]
        args: Vec<String>,
    },
}

impl Default for EntryPoint {
    fn default() -> Self {
        Self::Builtin { target: None }
    }
}

/// What a package directory declares about itself.
#[derive(Debug, Clone)]
pub struct DeclaredPackage {
    /// Normalized metadata.
    pub meta: PackageMetadata,
    /// How to load it.
    pub entry: EntryPoint,
    /// The package directory.
    pub dir: PathBuf,
}

/// The id a package directory stands for.
///
/// # Errors
///
/// Returns [`PackageError::Descriptor`] if the directory name is not UTF-8.
pub fn package_id_of(dir: &Path) -> PackageResult<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| PackageError::Descriptor {
            path: dir.to_path_buf(),
            message: "directory name is not valid UTF-8".to_string(),
        })
}

/// Read the static descriptor of a package directory, if it has one.
///
/// Prefers `Package.toml`, then `meta.json`. Returns `Ok(None)` when neither
/// exists.
///
/// # Errors
///
/// Returns [`PackageError::Descriptor`] if a descriptor exists but is
/// unreadable, malformed, names a different id, or declares invalid features.
pub fn read_package_dir(dir: &Path) -> PackageResult<Option<DeclaredPackage>> {
    let id = package_id_of(dir)?;

    let toml_path = dir.join(DESCRIPTOR_FILE_NAME);
    if toml_path.is_file() {
        let descriptor = load_descriptor(&toml_path)?;
        let meta = descriptor_metadata(&id, &toml_path, &descriptor)?;
        debug!(path = %toml_path.display(), package_id = %id, "read package descriptor");
        return Ok(Some(DeclaredPackage {
            meta,
            entry: descriptor.entry,
            dir: dir.to_path_buf(),
        }));
    }

    let legacy_path = dir.join(LEGACY_META_FILE_NAME);
    if legacy_path.is_file() {
        let meta = load_legacy_meta(&id, &legacy_path)?;
        debug!(path = %legacy_path.display(), package_id = %id, "read legacy metadata");
        return Ok(Some(DeclaredPackage {
            meta,
            entry: EntryPoint::default(),
            dir: dir.to_path_buf(),
        }));
    }

    Ok(None)
}

/// Parse a `Package.toml`.
///
/// # Errors
///
/// Returns [`PackageError::Descriptor`] on read or parse failure.
pub fn load_descriptor(path: &Path) -> PackageResult<PackageDescriptor> {
    let content = std::fs::read_to_string(path).map_err(|e| PackageError::Descriptor {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    toml::from_str(&content).map_err(|e| PackageError::Descriptor {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn descriptor_metadata(
    id: &str,
    path: &Path,
    descriptor: &PackageDescriptor,
) -> PackageResult<PackageMetadata> {
    if let Some(declared) = &descriptor.package.id
        && declared != id
    {
        return Err(PackageError::Descriptor {
            path: path.to_path_buf(),
            message: format!("declares id '{declared}' but lives in directory '{id}'"),
        });
    }

    let section = &descriptor.package;
    let meta = PackageMetadata {
        id: id.to_string(),
        name: section.name.clone(),
        description: section.description.clone(),
        version: section.version.clone(),
        features: descriptor.features.clone(),
    }
    .normalized();

    meta.validate().map_err(|message| PackageError::Descriptor {
        path: path.to_path_buf(),
        message,
    })?;
    Ok(meta)
}

#[derive(Deserialize)]
struct LegacyMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: String,
}

fn load_legacy_meta(id: &str, path: &Path) -> PackageResult<PackageMetadata> {
    let content = std::fs::read_to_string(path).map_err(|e| PackageError::Descriptor {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let legacy: LegacyMeta =
        serde_json::from_str(&content).map_err(|e| PackageError::Descriptor {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(PackageMetadata {
        id: id.to_string(),
        name: legacy.name,
        description: legacy.description,
        version: legacy.version,
        features: Vec::new(),
    }
    .normalized())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg_dir(root: &Path, id: &str, file: &str, contents: &str) -> PathBuf {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(file), contents).unwrap();
        dir
    }

    #[test]
    fn test_full_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = pkg_dir(
            tmp.path(),
            "fs",
            DESCRIPTOR_FILE_NAME,
            r#"
                [package]
                name = "File System"
                version = "2.1"

                [entry]
                kind = "process"
                command = "bin/fs-tool"
                args = ["--quiet"]

                [[feature]]
                id = "disk_space"
                name = "Disk Space"

                [[feature]]
                id = "tree"
            "#,
        );

        let declared = read_package_dir(&dir).unwrap().unwrap();
        assert_eq!(declared.meta.id, "fs");
        assert_eq!(declared.meta.name, "File System");
        assert_eq!(declared.meta.description, "");
        assert_eq!(declared.meta.version, "2.1");
        assert_eq!(declared.meta.features.len(), 2);
        assert_eq!(declared.meta.features[1].name, "tree");
        assert_eq!(
            declared.entry,
            EntryPoint::Process {
                command: PathBuf::from("bin/fs-tool"),
                args: vec!["--quiet".to_string()],
            }
        );
    }

    #[test]
    fn test_minimal_descriptor_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = pkg_dir(tmp.path(), "net", DESCRIPTOR_FILE_NAME, "");

        let declared = read_package_dir(&dir).unwrap().unwrap();
        assert_eq!(declared.meta.name, "net");
        assert_eq!(declared.meta.version, "0.0");
        assert!(declared.meta.features.is_empty());
        assert_eq!(declared.entry, EntryPoint::Builtin { target: None });
    }

    #[test]
    fn test_id_mismatch_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = pkg_dir(
            tmp.path(),
            "fs",
            DESCRIPTOR_FILE_NAME,
            "[package]\nid = \"other\"\n",
        );
        let err = read_package_dir(&dir).unwrap_err();
        assert!(err.to_string().contains("'other'"));
    }

    #[test]
    fn test_duplicate_features_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = pkg_dir(
            tmp.path(),
            "fs",
            DESCRIPTOR_FILE_NAME,
            "[[feature]]\nid = \"a\"\n[[feature]]\nid = \"a\"\n",
        );
        assert!(read_package_dir(&dir).is_err());
    }

    #[test]
    fn test_legacy_meta_json() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = pkg_dir(
            tmp.path(),
            "backup",
            LEGACY_META_FILE_NAME,
            r#"{"name": "Backup", "description": "Copies things"}"#,
        );

        let declared = read_package_dir(&dir).unwrap().unwrap();
        assert_eq!(declared.meta.id, "backup");
        assert_eq!(declared.meta.name, "Backup");
        assert_eq!(declared.meta.version, "0.0");
        assert!(declared.meta.features.is_empty());
    }

    #[test]
    fn test_package_toml_wins_over_meta_json() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = pkg_dir(
            tmp.path(),
            "fs",
            DESCRIPTOR_FILE_NAME,
            "[package]\nname = \"From Toml\"\n",
        );
        std::fs::write(dir.join(LEGACY_META_FILE_NAME), r#"{"name": "From Json"}"#).unwrap();

        let declared = read_package_dir(&dir).unwrap().unwrap();
        assert_eq!(declared.meta.name, "From Toml");
    }

    #[test]
    fn test_no_descriptor() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("empty");
        std::fs::create_dir_all(&dir).unwrap();
        assert!(read_package_dir(&dir).unwrap().is_none());
    }
}
