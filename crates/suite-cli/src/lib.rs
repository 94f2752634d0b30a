//! Suite CLI - shared plumbing for the `suite` and `suited` binaries.
//!
//! Both binaries resolve the suite home, load configuration, set up logging
//! and assemble the host runtime the same way; that lives here so the
//! binaries stay thin.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bootstrap;
pub mod theme;

pub use bootstrap::Session;
