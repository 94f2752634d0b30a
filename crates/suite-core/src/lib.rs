//! Suite Core - Foundation types and traits for the Utility Suite runtime.
//!
//! This crate provides:
//! - The `{success, data, message}` result envelope every dispatch returns
//! - The error taxonomy shared by the registry, loader, dispatcher and agent
//! - Package metadata types and the [`FeaturePackage`] contract
//! - The Capability Context handed to every feature invocation
//! - Atomic file writes and the suite home directory layout

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod atomic;
pub mod context;
pub mod dirs;
pub mod envelope;
pub mod error;
pub mod format;
pub mod package;
pub mod privileged;
pub mod store;

pub use atomic::{atomic_write, atomic_write_json};
pub use context::{CapabilityContext, Constants, ContextLogger};
pub use dirs::SuiteHome;
pub use envelope::Envelope;
pub use error::{DispatchError, ErrorKind, SuiteError, SuiteResult};
pub use format::OutputFormatter;
pub use package::{
    FeatureDescriptor, FeaturePackage, MetadataSource, PackageDescription, PackageMetadata,
};
pub use privileged::{PrivilegedOps, SystemdBroker, UnavailableBroker};
pub use store::ConfigStore;
