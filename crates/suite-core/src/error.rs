//! Error taxonomy for package discovery, loading and dispatch.

use std::path::PathBuf;

use thiserror::Error;

/// The closed set of failure kinds a dispatch (or the agent) can report.
///
/// The snake_case code of each kind prefixes the `message` of failure
/// envelopes, so callers can branch on it without parsing free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Package or feature id could not be resolved.
    NotFound,
    /// A loaded unit does not satisfy the package contract.
    ContractViolation,
    /// Package code failed while being loaded.
    ImportFailure,
    /// Package code failed while running a feature.
    ExecutionFailure,
    /// Caller supplied malformed arguments.
    ValidationFailure,
    /// Manifest or configuration read/write failed.
    IoFailure,
    /// Malformed or unauthorized control channel request.
    ProtocolError,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ContractViolation => "contract_violation",
            Self::ImportFailure => "import_failure",
            Self::ExecutionFailure => "execution_failure",
            Self::ValidationFailure => "validation_failure",
            Self::IoFailure => "io_failure",
            Self::ProtocolError => "protocol_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// A failure captured at the dispatch boundary.
///
/// Never propagated to the caller of `dispatch`; it is always folded into
/// a failure [`Envelope`](crate::Envelope) via [`DispatchError::into_envelope`].
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct DispatchError {
    kind: ErrorKind,
    message: String,
}

impl DispatchError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Package or feature not found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Package contract not satisfied.
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ContractViolation, message)
    }

    /// Package failed during load.
    pub fn import_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ImportFailure, message)
    }

    /// Package failed during `run`.
    pub fn execution_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionFailure, message)
    }

    /// Malformed caller arguments.
    pub fn validation_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationFailure, message)
    }

    /// The failure kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The detail message, without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Fold into a failure envelope whose message is `"<code>: <detail>"`.
    #[must_use]
    pub fn into_envelope(self) -> crate::Envelope {
        crate::Envelope::failure(self.to_string())
    }
}

/// Errors from the ambient services in this crate (stores, atomic writes,
/// privileged operations).
#[derive(Debug, Error)]
pub enum SuiteError {
    /// I/O error against a specific path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed.
    #[error("serialization error at {path}: {message}")]
    Serialization {
        /// Path being read or written.
        path: PathBuf,
        /// Serializer message.
        message: String,
    },

    /// A document name escaped the store directory.
    #[error("invalid document name: {0}")]
    InvalidName(String),

    /// A privileged operation could not be carried out.
    #[error("privileged operation failed: {0}")]
    Privileged(String),
}

impl SuiteError {
    /// Map to the dispatch taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Serialization { .. } => ErrorKind::IoFailure,
            Self::InvalidName(_) => ErrorKind::ValidationFailure,
            Self::Privileged(_) => ErrorKind::ExecutionFailure,
        }
    }
}

/// Result type for ambient core services.
pub type SuiteResult<T> = Result<T, SuiteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_kind_code() {
        let err = DispatchError::not_found("no package 'x'");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "not_found: no package 'x'");
    }

    #[test]
    fn into_envelope_is_failure_with_message() {
        let env = DispatchError::contract_violation("meta id mismatch").into_envelope();
        assert!(!env.success);
        assert_eq!(
            env.message.as_deref(),
            Some("contract_violation: meta id mismatch")
        );
        assert!(env.data.is_none());
    }

    #[test]
    fn suite_error_kinds() {
        let io = SuiteError::Io {
            path: PathBuf::from("/x"),
            source: std::io::Error::other("boom"),
        };
        assert_eq!(io.kind(), ErrorKind::IoFailure);
        assert_eq!(
            SuiteError::InvalidName("../x".into()).kind(),
            ErrorKind::ValidationFailure
        );
    }
}
