//! Suite Package - discovery, loading and dispatch of feature packages.
//!
//! The flow for one call is: [`Dispatcher`] → [`PackageLoader`] (resolve +
//! cache) → [`FeaturePackage::run`](suite_core::FeaturePackage::run) →
//! normalized [`Envelope`](suite_core::Envelope). Discovery is separate:
//! [`PackageRegistry::discover`] reads declared metadata without running
//! package code where possible and reconciles it into the [`ManifestStore`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod catalog;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod process;
pub mod registry;

mod isolation;

pub use catalog::{BuiltinCatalog, PackageFactory};
pub use descriptor::{DeclaredPackage, EntryPoint, PackageDescriptor};
pub use dispatcher::Dispatcher;
pub use error::{LoadError, ManifestError, ManifestResult, PackageError, PackageResult};
pub use loader::{LoadedPackage, PackageLoader};
pub use manifest::{Manifest, ManifestEntry, ManifestStore};
pub use process::ProcessPackage;
pub use registry::PackageRegistry;
