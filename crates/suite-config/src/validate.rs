//! Post-merge configuration validation.
//!
//! Checks value ranges and cross-field invariants on a deserialized
//! [`Config`](crate::Config).

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, Schedule};

/// Shortest tick the scheduler accepts.
const MIN_TICK_INTERVAL_MS: u64 = 10;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_host(config)?;
    validate_agent(config)?;
    validate_control(config)?;
    validate_tasks(config)?;
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate_host(config: &Config) -> ConfigResult<()> {
    let h = &config.host;

    if !matches!(
        h.log_level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "host.log_level",
            format!(
                "unsupported level '{}'; expected one of: trace, debug, info, warn, error",
                h.log_level
            ),
        ));
    }

    if !matches!(h.log_format.as_str(), "pretty" | "compact" | "json") {
        return Err(invalid(
            "host.log_format",
            format!(
                "unsupported format '{}'; expected one of: pretty, compact, json",
                h.log_format
            ),
        ));
    }

    if let Some(root) = &h.package_root
        && !root.is_absolute()
    {
        return Err(invalid(
            "host.package_root",
            format!("'{}' must be an absolute path", root.display()),
        ));
    }

    Ok(())
}

fn validate_agent(config: &Config) -> ConfigResult<()> {
    let a = &config.agent;

    if a.tick_interval_ms < MIN_TICK_INTERVAL_MS {
        return Err(invalid(
            "agent.tick_interval_ms",
            format!("must be at least {MIN_TICK_INTERVAL_MS}"),
        ));
    }
    if a.max_consecutive_failures == 0 {
        return Err(invalid(
            "agent.max_consecutive_failures",
            "must be greater than 0",
        ));
    }
    if a.worker_timeout_secs == 0 {
        return Err(invalid("agent.worker_timeout_secs", "must be greater than 0"));
    }

    Ok(())
}

fn validate_control(config: &Config) -> ConfigResult<()> {
    let c = &config.control;

    if c.read_timeout_ms == 0 {
        return Err(invalid("control.read_timeout_ms", "must be greater than 0"));
    }
    if c.max_frame_bytes == 0 {
        return Err(invalid("control.max_frame_bytes", "must be greater than 0"));
    }
    if c.token.as_deref().is_some_and(str::is_empty) {
        return Err(invalid(
            "control.token",
            "must not be empty; omit it to disable authentication",
        ));
    }

    Ok(())
}

fn validate_tasks(config: &Config) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for (i, task) in config.tasks.iter().enumerate() {
        if task.id.trim().is_empty() {
            return Err(invalid(format!("task[{i}].id"), "must not be empty"));
        }
        if !seen.insert(task.id.as_str()) {
            return Err(invalid(
                format!("task[{i}].id"),
                format!("duplicate task id '{}'", task.id),
            ));
        }
        if task.package.trim().is_empty() {
            return Err(invalid(format!("task[{i}].package"), "must not be empty"));
        }
        if task.feature.trim().is_empty() {
            return Err(invalid(format!("task[{i}].feature"), "must not be empty"));
        }
        if let Schedule::Interval { every_secs: 0 } = task.schedule {
            return Err(invalid(
                format!("task[{i}].schedule.every_secs"),
                "must be greater than 0",
            ));
        }
    }

    Ok(())
}
