//! Prelude module - commonly used types for convenient import.
//!
//! Use `use suite_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{DispatchError, ErrorKind, SuiteError, SuiteResult};

// Envelope and package contract
pub use crate::{Envelope, FeatureDescriptor, FeaturePackage, PackageMetadata};

// Context and services
pub use crate::{CapabilityContext, ConfigStore, Constants, OutputFormatter, PrivilegedOps};
