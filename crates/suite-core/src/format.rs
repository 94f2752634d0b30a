//! Output formatting helpers shared with packages through the context.
//!
//! Pure functions only: every helper returns a string and never prints.

use std::path::Path;

/// Size units, powers of 1024.
const SIZE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Stateless formatter exposed as `ctx.formatter`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFormatter;

impl OutputFormatter {
    /// Create a formatter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Render a byte count with a binary unit, e.g. `1536` → `"1.5KB"`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn human_readable_size(&self, bytes: u64, precision: usize) -> String {
        if bytes == 0 {
            return "0B".to_string();
        }
        let mut value = bytes as f64;
        let mut unit = 0usize;
        while value >= 1024.0 && unit < SIZE_UNITS.len().saturating_sub(1) {
            value /= 1024.0;
            unit = unit.saturating_add(1);
        }
        format!("{value:.precision$}{}", SIZE_UNITS[unit])
    }

    /// Render seconds with two decimals, e.g. `"1.50s"`.
    #[must_use]
    pub fn format_seconds(&self, seconds: f64) -> String {
        format!("{seconds:.2}s")
    }

    /// Shorten `text` to at most `max_len` characters by eliding the middle.
    #[must_use]
    pub fn truncate_middle(&self, text: &str, max_len: usize) -> String {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= max_len {
            return text.to_string();
        }
        if max_len <= 3 {
            return chars.iter().take(max_len).collect();
        }
        let keep = max_len.saturating_sub(3);
        let head = keep / 2;
        let tail = keep.saturating_sub(head);
        let start_tail = chars.len().saturating_sub(tail);
        let mut out: String = chars[..head].iter().collect();
        out.push_str("...");
        out.extend(&chars[start_tail..]);
        out
    }

    /// Apply a named rename rule to a file name.
    ///
    /// Known rules: `spaces_to_underscores`, `lowercase`, `prefix_date`,
    /// `remove_extension`. Unknown rules return the name unchanged.
    #[must_use]
    pub fn apply_rename_rule(&self, name: &str, rule: &str) -> String {
        match rule {
            "spaces_to_underscores" => name.replace(' ', "_"),
            "lowercase" => name.to_lowercase(),
            "prefix_date" => format!("{}_{name}", chrono::Local::now().format("%Y-%m-%d")),
            "remove_extension" => Path::new(name)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(name)
                .to_string(),
            _ => name.to_string(),
        }
    }
}
