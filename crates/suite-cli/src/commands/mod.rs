//! `suite` subcommands.

pub(crate) mod agent;
pub(crate) mod packages;
pub(crate) mod run;

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    /// Colored, human-oriented.
    Pretty,
    /// One JSON document on stdout.
    Json,
}

/// Print `value` as pretty JSON.
pub(crate) fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
