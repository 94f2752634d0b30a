//! Persistent JSON configuration store handed to packages.
//!
//! Documents are flat files under one directory, addressed by a simple name
//! (`"file_organizer"` resolves to `<dir>/file_organizer.json`). All writes
//! go through [`atomic_write_json`].

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::atomic::atomic_write_json;
use crate::error::{SuiteError, SuiteResult};

/// JSON document store rooted at one directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Create a store over `dir`. The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory backing this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a document name to its path.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::InvalidName`] for empty names or names that
    /// contain path separators or `..`.
    pub fn path_of(&self, name: &str) -> SuiteResult<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.starts_with('.')
        {
            return Err(SuiteError::InvalidName(name.to_string()));
        }
        let file = if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{name}.json")
        };
        Ok(self.dir.join(file))
    }

    /// Read a document. Missing or whitespace-only files read as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> SuiteResult<Option<T>> {
        let path = self.path_of(name)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SuiteError::Io { path, source }),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| SuiteError::Serialization {
                path,
                message: e.to_string(),
            })
    }

    /// Read a document, falling back to `T::default()` when it is missing,
    /// empty, or unreadable. Read failures are logged.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        match self.load_json(name) {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!(document = name, error = %e, "Config document unreadable; using default");
                T::default()
            },
        }
    }

    /// Atomically write a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the write fails.
    pub fn save_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> SuiteResult<()> {
        let path = self.path_of(name)?;
        atomic_write_json(&path, value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn missing_and_empty_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        assert!(store.load_json::<serde_json::Value>("absent").unwrap().is_none());

        std::fs::write(dir.path().join("empty.json"), "  \n").unwrap();
        assert!(store.load_json::<serde_json::Value>("empty").unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config"));
        let mut rules = BTreeMap::new();
        rules.insert("jpg".to_string(), "Images".to_string());

        store.save_json("file_organizer", &rules).unwrap();
        let back: BTreeMap<String, String> = store.load_json("file_organizer").unwrap().unwrap();
        assert_eq!(back, rules);
    }

    #[test]
    fn corrupt_document_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let store = ConfigStore::new(dir.path());
        assert!(store.load_json::<serde_json::Value>("bad").is_err());
        let fallback: BTreeMap<String, String> = store.load_or_default("bad");
        assert!(fallback.is_empty());
    }

    #[test]
    fn rejects_traversal_names() {
        let store = ConfigStore::new("/tmp/x");
        assert!(store.path_of("../etc/passwd").is_err());
        assert!(store.path_of("a/b").is_err());
        assert!(store.path_of("").is_err());
        assert_eq!(
            store.path_of("agent").unwrap(),
            PathBuf::from("/tmp/x/agent.json")
        );
    }
}
