//! Builtin feature packages.
//!
//! Each package here is a leaf: it satisfies
//! [`FeaturePackage`](suite_core::FeaturePackage) and is registered in the
//! [`catalog`] under the name a `Package.toml` refers to with
//! `[entry] kind = "builtin"`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod filesystem;

use suite_package::BuiltinCatalog;

pub use filesystem::FilesystemPackage;

/// Every builtin package, keyed by factory name.
#[must_use]
pub fn catalog() -> BuiltinCatalog {
    BuiltinCatalog::new().with(filesystem::PACKAGE_ID, |_dir| {
        Ok(Box::new(FilesystemPackage::new()))
    })
}
