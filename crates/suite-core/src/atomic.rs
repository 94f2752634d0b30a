//! Write-temp-then-rename file replacement.
//!
//! A reader of the destination path always observes either the previous
//! complete file or the new complete file, never a partial write.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::{SuiteError, SuiteResult};

/// Atomically replace `path` with `contents`.
///
/// The temporary file is created in the destination's own directory so the
/// final rename never crosses a filesystem boundary. Missing parent
/// directories are created.
///
/// # Errors
///
/// Returns [`SuiteError::Io`] if the temp file cannot be created, written,
/// synced, or renamed over the destination. On error the destination is
/// left untouched.
pub fn atomic_write(path: &Path, contents: &[u8]) -> SuiteResult<()> {
    let io_err = |source: std::io::Error| SuiteError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("suite");
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;

    tmp.write_all(contents).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and [`atomic_write`] it.
///
/// # Errors
///
/// Returns [`SuiteError::Serialization`] if `value` cannot be serialized,
/// otherwise the errors of [`atomic_write`].
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> SuiteResult<()> {
    let mut bytes =
        serde_json::to_vec_pretty(value).map_err(|e| SuiteError::Serialization {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    bytes.push(b'\n');
    atomic_write(path, &bytes)
}
