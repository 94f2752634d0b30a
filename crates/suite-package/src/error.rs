use std::path::PathBuf;

use thiserror::Error;

use suite_core::{DispatchError, ErrorKind, SuiteError};

/// Errors from reading package directories and descriptors.
#[derive(Debug, Error)]
pub enum PackageError {
    /// The package root does not exist or is not a directory.
    #[error("package root {path} does not exist")]
    RootMissing {
        /// Configured root.
        path: PathBuf,
    },

    /// A descriptor file could not be read or parsed.
    #[error("invalid descriptor at {path}: {message}")]
    Descriptor {
        /// Descriptor path.
        path: PathBuf,
        /// Parse or validation message.
        message: String,
    },

    /// Directory listing failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for registry operations.
pub type PackageResult<T> = Result<T, PackageError>;

/// Errors from reading or writing the manifest file.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The file exists but could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid manifest document.
    #[error("corrupt manifest {path}: {source}")]
    Corrupt {
        /// Manifest path.
        path: PathBuf,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The atomic write failed.
    #[error(transparent)]
    Write(#[from] SuiteError),
}

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Why a package could not be loaded.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// No package directory with that id.
    #[error("{0}")]
    NotFound(String),

    /// Package code failed while being instantiated.
    #[error("{0}")]
    ImportFailure(String),

    /// The package loaded but does not satisfy the contract.
    #[error("{0}")]
    ContractViolation(String),
}

impl LoadError {
    /// Map to the dispatch taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ImportFailure(_) => ErrorKind::ImportFailure,
            Self::ContractViolation(_) => ErrorKind::ContractViolation,
        }
    }
}

impl From<LoadError> for DispatchError {
    fn from(err: LoadError) -> Self {
        let kind = err.kind();
        let message = match err {
            LoadError::NotFound(m) | LoadError::ImportFailure(m) | LoadError::ContractViolation(m) => m,
        };
        DispatchError::new(kind, message)
    }
}
