use std::path::PathBuf;

use thiserror::Error;

use suite_config::ConfigError;
use suite_core::SuiteError;
use suite_package::PackageError;

/// Errors from the agent and its runtime.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The package root could not be opened.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Agent state could not be written.
    #[error(transparent)]
    State(#[from] SuiteError),

    /// File-level I/O failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Another agent already owns this home.
    #[error("agent already running with pid {pid}")]
    AlreadyRunning {
        /// Pid from the pid file.
        pid: u32,
    },

    /// No task with that id.
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    /// Control channel failure on the client side.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Control channel framing and transport errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A frame announced more bytes than allowed.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Announced length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// The body was not the expected JSON.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The peer took too long.
    #[error("timed out")]
    Timeout,

    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// Socket I/O failed.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Wire error code sent back to the peer for this failure.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::FrameTooLarge { .. } => "frame_too_large",
            Self::Malformed(_) => "malformed_request",
            Self::Timeout => "timeout",
            Self::Closed | Self::Io(_) => "protocol_error",
        }
    }
}
