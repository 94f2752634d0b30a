//! Environment variable overrides.
//!
//! Only a handful of settings can be overridden from the environment. They
//! are applied to the merged TOML document before deserialization, so they
//! go through the same type checks and validation as file values.

use std::collections::HashMap;

use tracing::debug;

/// Overrides `host.package_root`.
pub const ENV_PACKAGE_ROOT: &str = "SUITE_PACKAGE_ROOT";
/// Overrides `host.log_level`.
pub const ENV_LOG_LEVEL: &str = "SUITE_LOG_LEVEL";
/// Overrides `control.token`.
pub const ENV_CONTROL_TOKEN: &str = "SUITE_CONTROL_TOKEN";

const OVERRIDES: &[(&str, &str, &str)] = &[
    (ENV_PACKAGE_ROOT, "host", "package_root"),
    (ENV_LOG_LEVEL, "host", "log_level"),
    (ENV_CONTROL_TOKEN, "control", "token"),
];

/// Snapshot the recognised `SUITE_*` variables from the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    OVERRIDES
        .iter()
        .filter_map(|(name, _, _)| {
            std::env::var(name)
                .ok()
                .map(|value| ((*name).to_owned(), value))
        })
        .collect()
}

/// Apply overrides from `env` onto a merged TOML document.
///
/// Empty values are ignored.
pub fn apply_env_overrides(doc: &mut toml::Value, env: &HashMap<String, String>) {
    let Some(root) = doc.as_table_mut() else {
        return;
    };

    for (name, section, key) in OVERRIDES {
        let Some(value) = env.get(*name).filter(|v| !v.is_empty()) else {
            continue;
        };
        debug!(var = *name, field = %format!("{section}.{key}"), "applying env override");

        let table = root
            .entry((*section).to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        if let Some(table) = table.as_table_mut() {
            table.insert((*key).to_owned(), toml::Value::String(value.clone()));
        }
    }
}
