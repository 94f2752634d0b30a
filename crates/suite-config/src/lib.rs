#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration for the Utility Suite host and background agent.
//!
//! # Usage
//!
//! ```rust,no_run
//! use suite_config::Config;
//!
//! // defaults.toml → <home>/config.toml → SUITE_* environment overrides
//! let config = Config::load(std::path::Path::new("/home/me/.suite")).unwrap();
//! for task in &config.tasks {
//!     println!("{} -> {}/{}", task.id, task.package, task.feature);
//! }
//! ```
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`SUITE_PACKAGE_ROOT`, `SUITE_LOG_LEVEL`,
//!    `SUITE_CONTROL_TOKEN`)
//! 2. **User** (`<home>/config.toml`)
//! 3. **Embedded defaults** (`defaults.toml` compiled into binary)
//!
//! This crate has no dependencies on other internal suite crates. The agent
//! converts [`TaskConfig`] entries into its own task specs at startup.

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Layered configuration merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration for the suite home at `home_dir`.
    ///
    /// See [`loader::load`] for the full algorithm.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the config file is malformed or the final
    /// configuration fails validation.
    pub fn load(home_dir: &std::path::Path) -> ConfigResult<Self> {
        loader::load(home_dir, &env::collect_env_vars())
    }

    /// Load configuration from a single file (no layering, no env).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
