//! `suite run`: dispatch one feature and print its envelope.

use anyhow::Result;
use colored::Colorize;

use suite_cli::Session;
use suite_cli::theme::Theme;

use super::{OutputFormat, print_json};

/// Dispatch `package_id`/`feature_id` with `args` (JSON text). Returns
/// whether the feature succeeded.
pub(crate) fn run_feature(
    session: &Session,
    package_id: &str,
    feature_id: &str,
    args: Option<&str>,
    format: OutputFormat,
) -> Result<bool> {
    let runtime = session.open_runtime()?;
    let envelope = runtime.dispatch_json(package_id, feature_id, args.unwrap_or(""));

    if format == OutputFormat::Json {
        print_json(&serde_json::to_value(&envelope)?)?;
        return Ok(envelope.success);
    }

    if envelope.success {
        println!("{}", Theme::success(&format!("{package_id}/{feature_id}")));
    } else {
        println!("{}", Theme::error(&format!("{package_id}/{feature_id} failed")));
    }
    if let Some(message) = &envelope.message {
        println!("  {}", message.yellow());
    }
    if let Some(data) = &envelope.data {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(envelope.success)
}
