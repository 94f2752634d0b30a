//! Suite Test - Shared test utilities for the Utility Suite runtime.
//!
//! This crate provides stub packages, package-root fixtures and tracing
//! setup that can be used across the suite crates as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! suite-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use suite_test::{PackageRootBuilder, TestHome};
//!
//! let home = TestHome::new();
//! PackageRootBuilder::new(home.packages_dir())
//!     .builtin("fs", &[("disk_space", "Disk Space")])
//!     .empty_dir("junk")
//!     .build();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod packages;

pub use fixtures::*;
pub use packages::*;

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `debug` for suite crates. Safe to call from
/// every test.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,suite_package=debug,suite_agent=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
