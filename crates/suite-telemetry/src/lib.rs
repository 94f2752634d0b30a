//! Suite Telemetry - Logging for the Utility Suite runtime.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats
//! - Stderr, rolling-file, or combined output
//! - Integration with the tracing ecosystem
//!
//! # Example
//!
//! ```rust,no_run
//! use suite_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), suite_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("suite_package=trace");
//!
//! // Keep the guard alive for the life of the process so buffered file
//! // output is flushed on exit.
//! let _guard = setup_logging(&config)?;
//! tracing::info!("Logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogGuard, LogTarget, setup_default_logging, setup_logging};
