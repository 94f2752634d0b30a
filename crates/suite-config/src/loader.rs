//! Configuration file loading.
//!
//! Layers the embedded defaults, the user's `config.toml` and environment
//! overrides into one [`Config`], then validates it.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::env::apply_env_overrides;
use crate::error::{ConfigError, ConfigResult};
use crate::merge::deep_merge;
use crate::types::Config;
use crate::validate::validate;

/// Embedded defaults, the lowest-priority layer.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Name of the user config file inside the suite home.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Load the layered configuration for `home_dir`.
///
/// 1. Parse embedded `defaults.toml`.
/// 2. Deep-merge `<home_dir>/config.toml` if it exists.
/// 3. Apply environment overrides from `env`.
/// 4. Deserialize and validate.
///
/// # Errors
///
/// Returns an error if the user file is unreadable, malformed, or the final
/// configuration fails validation. A missing user file is not an error.
pub fn load(home_dir: &Path, env: &HashMap<String, String>) -> ConfigResult<Config> {
    let mut doc = parse_toml(DEFAULTS_TOML, "<defaults>")?;

    let user_path = home_dir.join(CONFIG_FILE_NAME);
    if let Some(user) = try_load_file(&user_path)? {
        info!(path = %user_path.display(), "loaded user config");
        deep_merge(&mut doc, user);
    } else {
        debug!(path = %user_path.display(), "no user config, using defaults");
    }

    apply_env_overrides(&mut doc, env);
    finish(doc, "<merged>")
}

/// Load a single file on top of the embedded defaults, without env overrides.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable, malformed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let mut doc = parse_toml(DEFAULTS_TOML, "<defaults>")?;
    let user = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
    })?;
    deep_merge(&mut doc, user);
    finish(doc, &path.display().to_string())
}

fn finish(doc: toml::Value, label: &str) -> ConfigResult<Config> {
    let config: Config = doc.try_into().map_err(|source| ConfigError::ParseError {
        path: label.to_owned(),
        source,
    })?;
    validate(&config)?;
    Ok(config)
}

fn parse_toml(content: &str, label: &str) -> ConfigResult<toml::Value> {
    toml::from_str(content).map_err(|source| ConfigError::ParseError {
        path: label.to_owned(),
        source,
    })
}

/// Read and parse `path`, or `Ok(None)` if it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source,
            });
        },
    };

    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes; the limit is {MAX_CONFIG_FILE_SIZE}",
                metadata.len()
            ),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml(&content, &path.display().to_string()).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ENV_CONTROL_TOKEN, ENV_PACKAGE_ROOT};
    use crate::types::{ExecutionMode, Schedule};

    #[test]
    fn test_defaults_only() {
        let home = tempfile::tempdir().unwrap();
        let config = load(home.path(), &HashMap::new()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_user_file_overrides_defaults() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join(CONFIG_FILE_NAME),
            r#"
                [agent]
                tick_interval_ms = 50

                [[task]]
                id = "scan"
                package = "filesystem"
                feature = "disk_space"
                schedule = { type = "interval", every_secs = 30 }
                mode = "heavy"
            "#,
        )
        .unwrap();

        let config = load(home.path(), &HashMap::new()).unwrap();
        assert_eq!(config.agent.tick_interval_ms, 50);
        assert_eq!(config.agent.max_consecutive_failures, 3);
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].schedule, Schedule::Interval { every_secs: 30 });
        assert_eq!(config.tasks[0].mode, ExecutionMode::Heavy);
    }

    #[test]
    fn test_env_beats_user_file() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join(CONFIG_FILE_NAME),
            "[control]\ntoken = \"from-file\"\n",
        )
        .unwrap();
        let env = HashMap::from([
            (ENV_CONTROL_TOKEN.to_owned(), "from-env".to_owned()),
            (ENV_PACKAGE_ROOT.to_owned(), "/srv/packages".to_owned()),
        ]);

        let config = load(home.path(), &env).unwrap();
        assert_eq!(config.control.token.as_deref(), Some("from-env"));
        assert_eq!(
            config.host.package_root.as_deref(),
            Some(Path::new("/srv/packages"))
        );
    }

    #[test]
    fn test_malformed_user_file_is_parse_error() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(CONFIG_FILE_NAME), "[agent\n").unwrap();

        let err = load(home.path(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join(CONFIG_FILE_NAME),
            "[agent]\ntick_interval_ms = \"fast\"\n",
        )
        .unwrap();

        let err = load(home.path(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_invalid_value_is_validation_error() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join(CONFIG_FILE_NAME),
            "[agent]\nworker_timeout_secs = 0\n",
        )
        .unwrap();

        let err = load(home.path(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "agent.worker_timeout_secs"));
    }

    #[test]
    fn test_load_file_missing_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }
}
