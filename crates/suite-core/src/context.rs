//! The Capability Context passed into every dispatched call.
//!
//! Constructed once at startup and shared by handle. Nothing in the
//! runtime reaches for global state: packages get their logger, formatter,
//! config store, privileged broker and constants from here.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::dirs::SuiteHome;
use crate::format::OutputFormatter;
use crate::privileged::PrivilegedOps;
use crate::store::ConfigStore;

/// Application name used for log file prefixes and service names.
pub const APP_NAME: &str = "utility_suite";

/// Static facts about the running installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constants {
    /// Application name.
    pub app_name: String,
    /// Runtime version.
    pub version: String,
    /// Suite home directory.
    pub home_dir: PathBuf,
    /// Directory scanned for packages.
    pub package_root: PathBuf,
    /// Directory holding log files.
    pub log_dir: PathBuf,
}

impl Constants {
    /// Derive constants from a home layout and a package root.
    #[must_use]
    pub fn new(home: &SuiteHome, package_root: impl Into<PathBuf>) -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            home_dir: home.root().to_path_buf(),
            package_root: package_root.into(),
            log_dir: home.logs_dir(),
        }
    }
}

/// Logger handed to packages, scoped to the current package/feature.
///
/// Events are emitted through `tracing` inside the scope's span, so they
/// carry `package_id`/`feature_id` fields without the package naming them.
#[derive(Debug, Clone)]
pub struct ContextLogger {
    span: Span,
}

impl ContextLogger {
    /// Wrap an existing span.
    #[must_use]
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// The span events are recorded in.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Debug-level event.
    pub fn debug(&self, message: &str) {
        self.span.in_scope(|| tracing::debug!(target: "suite::package", "{message}"));
    }

    /// Info-level event.
    pub fn info(&self, message: &str) {
        self.span.in_scope(|| tracing::info!(target: "suite::package", "{message}"));
    }

    /// Warn-level event.
    pub fn warn(&self, message: &str) {
        self.span.in_scope(|| tracing::warn!(target: "suite::package", "{message}"));
    }

    /// Error-level event.
    pub fn error(&self, message: &str) {
        self.span.in_scope(|| tracing::error!(target: "suite::package", "{message}"));
    }
}

/// Immutable bundle of shared services for one dispatch.
///
/// Cloning is cheap (`Arc` fields). No package may assume exclusive
/// ownership of any field.
#[derive(Debug, Clone)]
pub struct CapabilityContext {
    logger: ContextLogger,
    formatter: OutputFormatter,
    config_store: Arc<ConfigStore>,
    privileged: Arc<dyn PrivilegedOps>,
    constants: Arc<Constants>,
    cancel: CancellationToken,
}

impl CapabilityContext {
    /// Build the root context.
    #[must_use]
    pub fn new(
        config_store: ConfigStore,
        privileged: Arc<dyn PrivilegedOps>,
        constants: Constants,
    ) -> Self {
        Self {
            logger: ContextLogger::new(tracing::info_span!("suite")),
            formatter: OutputFormatter::new(),
            config_store: Arc::new(config_store),
            privileged,
            constants: Arc::new(constants),
            cancel: CancellationToken::new(),
        }
    }

    /// A copy whose logger is scoped to one package feature.
    #[must_use]
    pub fn scoped(&self, package_id: &str, feature_id: &str) -> Self {
        let span = self.logger.span().in_scope(|| {
            tracing::info_span!("feature", package_id = %package_id, feature_id = %feature_id)
        });
        Self {
            logger: ContextLogger::new(span),
            ..self.clone()
        }
    }

    /// A copy that observes `token` for cooperative cancellation.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// Logger scoped to the current call.
    #[must_use]
    pub fn logger(&self) -> &ContextLogger {
        &self.logger
    }

    /// Output formatting helpers.
    #[must_use]
    pub fn formatter(&self) -> &OutputFormatter {
        &self.formatter
    }

    /// Persistent JSON config store.
    #[must_use]
    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    /// Privileged-operation broker.
    #[must_use]
    pub fn privileged(&self) -> &dyn PrivilegedOps {
        self.privileged.as_ref()
    }

    /// Installation constants.
    #[must_use]
    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    /// Whether the caller asked this execution to stop.
    ///
    /// Long-running features check this between work units.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
