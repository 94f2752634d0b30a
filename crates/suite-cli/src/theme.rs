//! CLI theme and styling.

use colored::Colorize;

/// CLI theme configuration.
pub struct Theme;

impl Theme {
    /// Format a header.
    #[must_use]
    pub fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    /// Format a success message.
    #[must_use]
    pub fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    /// Format an error message.
    #[must_use]
    pub fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    /// Format a warning message.
    #[must_use]
    pub fn warning(text: &str) -> String {
        format!("{} {}", "!".yellow(), text.yellow())
    }

    /// Format a dimmed message.
    #[must_use]
    pub fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    /// Format a separator line.
    #[must_use]
    pub fn separator() -> String {
        "━".repeat(50).dimmed().to_string()
    }

    /// Colored task or package state label.
    #[must_use]
    pub fn state(label: &str) -> String {
        match label {
            "idle" | "enabled" => label.green().to_string(),
            "running" => label.cyan().to_string(),
            "stopped" | "disabled" => label.yellow().to_string(),
            "failed" => label.red().bold().to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_survives_styling() {
        colored::control::set_override(false);
        assert_eq!(Theme::success("done"), "✓ done");
        assert_eq!(Theme::state("failed"), "failed");
        assert_eq!(Theme::header("Packages"), "Packages");
    }
}
