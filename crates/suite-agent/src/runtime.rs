//! Host runtime assembly.
//!
//! Builds the registry, loader, dispatcher and the one Capability Context
//! shared by every call. Both binaries start here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use suite_config::Config;
use suite_core::{
    CapabilityContext, ConfigStore, Constants, DispatchError, Envelope, PrivilegedOps, SuiteHome,
    SystemdBroker, UnavailableBroker,
};
use suite_package::{BuiltinCatalog, Dispatcher, ManifestStore, PackageLoader, PackageRegistry};

use crate::error::{AgentError, AgentResult};

/// Everything needed to discover and dispatch packages.
#[derive(Debug, Clone)]
pub struct HostRuntime {
    home: SuiteHome,
    registry: PackageRegistry,
    loader: Arc<PackageLoader>,
    dispatcher: Dispatcher,
    ctx: CapabilityContext,
}

impl HostRuntime {
    /// Assemble the runtime for `home` as configured by `config`.
    ///
    /// The default package root (`<home>/packages`) is created on demand; an
    /// explicitly configured root must already exist.
    ///
    /// # Errors
    ///
    /// [`AgentError::Io`] if the home layout cannot be created, or
    /// [`AgentError::Package`] if the package root is missing.
    pub fn open(
        home: SuiteHome,
        config: &Config,
        catalog: BuiltinCatalog,
        privileged: Arc<dyn PrivilegedOps>,
    ) -> AgentResult<Self> {
        home.ensure().map_err(|source| AgentError::Io {
            path: home.root().to_path_buf(),
            source,
        })?;

        let root = package_root(&home, config);
        let catalog = Arc::new(catalog);
        let store = ManifestStore::new(home.manifest_path());
        let registry = PackageRegistry::open(&root, store.clone(), Arc::clone(&catalog))?;
        let loader = Arc::new(PackageLoader::new(&root, catalog));
        let dispatcher = Dispatcher::new(Arc::clone(&loader), store);
        let ctx = CapabilityContext::new(
            ConfigStore::new(home.config_dir()),
            privileged,
            Constants::new(&home, &root),
        );

        info!(home = %home.root().display(), package_root = %root.display(), "host runtime ready");
        Ok(Self {
            home,
            registry,
            loader,
            dispatcher,
            ctx,
        })
    }

    /// Suite home.
    #[must_use]
    pub fn home(&self) -> &SuiteHome {
        &self.home
    }

    /// Package root in use.
    #[must_use]
    pub fn package_root(&self) -> &Path {
        self.registry.root()
    }

    /// The registry.
    #[must_use]
    pub fn registry(&self) -> &PackageRegistry {
        &self.registry
    }

    /// The shared loader (and its cache).
    #[must_use]
    pub fn loader(&self) -> &Arc<PackageLoader> {
        &self.loader
    }

    /// The dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Root Capability Context.
    #[must_use]
    pub fn context(&self) -> &CapabilityContext {
        &self.ctx
    }

    /// Dispatch once with the root context.
    pub fn dispatch(&self, package_id: &str, feature_id: &str, args: Value) -> Envelope {
        self.dispatcher
            .dispatch(package_id, feature_id, args, &self.ctx)
    }

    /// Dispatch once with `args` given as JSON text.
    ///
    /// Empty input means no arguments; unparseable input is a
    /// `validation_failure`. Used by worker processes.
    pub fn dispatch_json(&self, package_id: &str, feature_id: &str, args: &str) -> Envelope {
        let args = if args.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(args) {
                Ok(value) => value,
                Err(e) => {
                    debug!(package_id, feature_id, error = %e, "unparseable worker args");
                    return DispatchError::validation_failure(format!("args are not valid JSON: {e}"))
                        .into_envelope();
                },
            }
        };
        self.dispatch(package_id, feature_id, args)
    }
}

/// Configured package root, or `<home>/packages`.
#[must_use]
pub fn package_root(home: &SuiteHome, config: &Config) -> PathBuf {
    config
        .host
        .package_root
        .clone()
        .unwrap_or_else(|| home.packages_dir())
}

/// Pick a privileged broker for this process.
///
/// System-wide systemd when running as root, per-user systemd when `$HOME` is
/// known, otherwise a broker that refuses everything.
#[must_use]
pub fn default_broker() -> Arc<dyn PrivilegedOps> {
    let system = SystemdBroker::system();
    if system.is_privileged() {
        return Arc::new(system);
    }
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => Arc::new(SystemdBroker::user(Path::new(&home))),
        _ => Arc::new(UnavailableBroker),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use suite_package::PackageError;
    use suite_test::packages::{EchoPackage, PanickingPackage};

    use super::*;

    fn catalog() -> BuiltinCatalog {
        BuiltinCatalog::new()
            .with("echo", |_| Ok(Box::new(EchoPackage::new("echo"))))
            .with("boom", |_| Ok(Box::new(PanickingPackage::new("boom"))))
    }

    fn open(dir: &Path) -> HostRuntime {
        let home = SuiteHome::from_path(dir);
        HostRuntime::open(home, &Config::default(), catalog(), Arc::new(UnavailableBroker)).unwrap()
    }

    #[test]
    fn test_default_root_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = open(dir.path());
        assert_eq!(runtime.package_root(), dir.path().join("packages"));
        assert!(runtime.package_root().is_dir());
    }

    #[test]
    fn test_configured_root_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.host.package_root = Some(dir.path().join("nowhere"));
        let err = HostRuntime::open(
            SuiteHome::from_path(dir.path()),
            &config,
            catalog(),
            Arc::new(UnavailableBroker),
        )
        .unwrap_err();
        assert!(matches!(err, AgentError::Package(PackageError::RootMissing { .. })));
    }

    #[test]
    fn test_dispatch_json() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = open(dir.path());
        std::fs::create_dir(runtime.package_root().join("echo")).unwrap();

        let env = runtime.dispatch_json("echo", "echo", r#"{"n": 1}"#);
        assert!(env.success, "{env:?}");
        assert_eq!(env.data, Some(json!({"n": 1})));

        let env = runtime.dispatch_json("echo", "echo", "");
        assert_eq!(env.data, Some(json!({})));

        let env = runtime.dispatch_json("echo", "echo", "{oops");
        assert!(env.message.unwrap().starts_with("validation_failure"));
    }

    #[test]
    fn test_panic_leaves_runtime_usable() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = open(dir.path());
        std::fs::create_dir(runtime.package_root().join("echo")).unwrap();
        std::fs::create_dir(runtime.package_root().join("boom")).unwrap();

        let env = runtime.dispatch("boom", "boom", Value::Null);
        assert!(!env.success);
        assert!(runtime.dispatch("echo", "echo", Value::Null).success);
    }
}
