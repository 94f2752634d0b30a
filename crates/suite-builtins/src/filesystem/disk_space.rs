//! Largest entries directly under a directory, by recursive size.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use walkdir::WalkDir;

use suite_core::CapabilityContext;

pub(super) const FEATURE_ID: &str = "disk_space";

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Args {
    path: PathBuf,
    top_n: usize,
    /// Limit on how deep folder sizes are summed; unlimited when unset.
    depth: Option<usize>,
    human_readable: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            top_n: 20,
            depth: None,
            human_readable: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct Row {
    path: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_hr: Option<String>,
}

pub(super) fn run(args: &Map<String, Value>, ctx: &CapabilityContext) -> anyhow::Result<Value> {
    let args: Args = serde_json::from_value(Value::Object(args.clone()))
        .context("invalid disk_space arguments")?;

    if !args.path.is_dir() {
        return Ok(json!({
            "success": false,
            "data": null,
            "message": format!("Invalid directory: {}", args.path.display()),
        }));
    }

    let entries = std::fs::read_dir(&args.path)
        .with_context(|| format!("failed to list {}", args.path.display()))?;

    let mut items: Vec<(PathBuf, u64)> = Vec::new();
    for entry in entries {
        if ctx.should_stop() {
            ctx.logger().info("disk scan stopped early");
            break;
        }
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                ctx.logger().warn(&format!("skipping unreadable entry: {e}"));
                continue;
            },
        };
        let path = entry.path();
        let size = match entry.file_type() {
            Ok(ft) if ft.is_dir() => folder_size(&path, args.depth, ctx),
            Ok(ft) if ft.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            Ok(_) => 0,
            Err(e) => {
                ctx.logger().warn(&format!("failed to stat {}: {e}", path.display()));
                continue;
            },
        };
        items.push((path, size));
    }

    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(args.top_n);

    let rows: Vec<Row> = items
        .into_iter()
        .map(|(path, size)| Row {
            path: path.display().to_string(),
            size,
            size_hr: args
                .human_readable
                .then(|| ctx.formatter().human_readable_size(size, 1)),
        })
        .collect();

    Ok(json!({ "success": true, "data": rows, "message": null }))
}

/// Sum of file sizes under `dir`, not following symlinks.
fn folder_size(dir: &Path, depth: Option<usize>, ctx: &CapabilityContext) -> u64 {
    let mut walker = WalkDir::new(dir).follow_links(false);
    if let Some(depth) = depth {
        walker = walker.max_depth(depth);
    }

    let mut total: u64 = 0;
    for entry in walker {
        if ctx.should_stop() {
            break;
        }
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let len = entry.metadata().map(|m| m.len()).unwrap_or(0);
                total = total.saturating_add(len);
            },
            Ok(_) => {},
            Err(e) => ctx.logger().debug(&format!("skipping {e}")),
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use suite_test::TestHome;

    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("small.txt"), vec![b'a'; 10]).unwrap();
        std::fs::create_dir_all(dir.path().join("big/nested")).unwrap();
        std::fs::write(dir.path().join("big/one.bin"), vec![0u8; 2048]).unwrap();
        std::fs::write(dir.path().join("big/nested/two.bin"), vec![0u8; 1024]).unwrap();
        std::fs::write(dir.path().join("medium.log"), vec![b'x'; 500]).unwrap();
        dir
    }

    #[test]
    fn test_sorted_by_recursive_size() {
        let home = TestHome::new();
        let dir = tree();
        let out = run(&args(json!({"path": dir.path()})), &home.context()).unwrap();

        assert_eq!(out["success"], true);
        let rows = out["data"].as_array().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0]["path"].as_str().unwrap().ends_with("big"));
        assert_eq!(rows[0]["size"], 3072);
        assert_eq!(rows[0]["size_hr"], "3.0KB");
        assert_eq!(rows[1]["size"], 500);
        assert_eq!(rows[2]["size"], 10);
    }

    #[test]
    fn test_top_n_and_plain_sizes() {
        let home = TestHome::new();
        let dir = tree();
        let out = run(
            &args(json!({"path": dir.path(), "top_n": 1, "human_readable": false})),
            &home.context(),
        )
        .unwrap();

        let rows = out["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("size_hr").is_none());
    }

    #[test]
    fn test_depth_limits_folder_sum() {
        let home = TestHome::new();
        let dir = tree();
        let out = run(&args(json!({"path": dir.path(), "depth": 1})), &home.context()).unwrap();
        assert_eq!(out["data"][0]["size"], 2048);
    }

    #[test]
    fn test_invalid_directory_is_failure_envelope() {
        let home = TestHome::new();
        let out = run(&args(json!({"path": "/definitely/not/here"})), &home.context()).unwrap();
        assert_eq!(out["success"], false);
        assert!(out["message"].as_str().unwrap().starts_with("Invalid directory"));
    }

    #[test]
    fn test_bad_argument_type_is_error() {
        let home = TestHome::new();
        assert!(run(&args(json!({"top_n": "many"})), &home.context()).is_err());
    }
}
