use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML, or does not match the schema.
    #[error("failed to parse config {path}: {source}")]
    ParseError {
        /// File path (or a `<...>` label for in-memory sources).
        path: String,
        /// TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A field holds a value outside its allowed range.
    #[error("invalid config value for {field}: {message}")]
    ValidationError {
        /// Dotted field path, e.g. `agent.tick_interval_ms`.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
