//! Dispatcher: resolve, invoke and normalize, with failure containment.
//!
//! Nothing raised by package code escapes [`Dispatcher::dispatch`]. Errors,
//! panics, load failures and bad arguments all come back as failure
//! envelopes whose message starts with the failure's code.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use suite_core::{CapabilityContext, DispatchError, Envelope};

use crate::isolation::contain_panic;
use crate::loader::PackageLoader;
use crate::manifest::ManifestStore;

/// Routes `(package, feature, args)` calls to loaded packages.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    loader: Arc<PackageLoader>,
    manifest: Option<ManifestStore>,
}

impl Dispatcher {
    /// Dispatcher over `loader` that honors enabled flags in `manifest`.
    #[must_use]
    pub fn new(loader: Arc<PackageLoader>, manifest: ManifestStore) -> Self {
        Self {
            loader,
            manifest: Some(manifest),
        }
    }

    /// Dispatcher that ignores enabled flags.
    #[must_use]
    pub fn without_manifest(loader: Arc<PackageLoader>) -> Self {
        Self {
            loader,
            manifest: None,
        }
    }

    /// The underlying loader.
    #[must_use]
    pub fn loader(&self) -> &Arc<PackageLoader> {
        &self.loader
    }

    /// Invoke `feature_id` of `package_id` with `args`.
    ///
    /// `args` must be a JSON object or `null` (treated as `{}`). Always
    /// returns an envelope; never panics because of package code.
    pub fn dispatch(
        &self,
        package_id: &str,
        feature_id: &str,
        args: Value,
        ctx: &CapabilityContext,
    ) -> Envelope {
        match self.try_dispatch(package_id, feature_id, args, ctx) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(package_id, feature_id, error = %e, "dispatch failed");
                e.into_envelope()
            },
        }
    }

    fn try_dispatch(
        &self,
        package_id: &str,
        feature_id: &str,
        args: Value,
        ctx: &CapabilityContext,
    ) -> Result<Envelope, DispatchError> {
        if feature_id.trim().is_empty() {
            return Err(DispatchError::validation_failure("feature id must not be empty"));
        }

        if let Some(manifest) = &self.manifest
            && !manifest.load().is_enabled(package_id)
        {
            return Err(DispatchError::not_found(format!(
                "package '{package_id}' is disabled"
            )));
        }

        let package = self.loader.load(package_id).map_err(|e| {
            warn!(package_id, error = %e, "package failed to load");
            DispatchError::from(e)
        })?;

        if !package.meta().has_feature(feature_id) {
            return Err(DispatchError::not_found(format!(
                "unknown feature '{feature_id}' for package '{package_id}'"
            )));
        }

        let args = object_args(args)?;
        let scoped = ctx.scoped(package_id, feature_id);
        let started = Instant::now();

        let outcome = contain_panic(|| package.run(feature_id, &args, &scoped));
        let elapsed = ctx.formatter().format_seconds(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(value)) => {
                debug!(package_id, feature_id, elapsed = %elapsed, "feature completed");
                Ok(Envelope::coerce(value))
            },
            Ok(Err(e)) => {
                error!(package_id, feature_id, error = ?e, "feature failed");
                scoped.logger().error(&format!("feature failed after {elapsed}: {e:?}"));
                Err(DispatchError::execution_failure(format!(
                    "feature '{feature_id}' of package '{package_id}' failed: {e}"
                )))
            },
            Err(panic) => {
                error!(package_id, feature_id, panic = %panic, "feature panicked");
                scoped.logger().error(&format!("feature panicked after {elapsed}: {panic}"));
                Err(DispatchError::execution_failure(format!(
                    "feature '{feature_id}' of package '{package_id}' panicked: {panic}"
                )))
            },
        }
    }
}

fn object_args(args: Value) -> Result<Map<String, Value>, DispatchError> {
    match args {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(DispatchError::validation_failure(format!(
            "args must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use suite_test::{EchoPackage, FailingPackage, PackageRootBuilder, PanickingPackage, TestHome};

    use super::*;
    use crate::catalog::BuiltinCatalog;

    fn setup(home: &TestHome) -> Dispatcher {
        PackageRootBuilder::new(home.packages_dir())
            .builtin("echo", &[("echo", "Echo")])
            .builtin("fail", &[("fail", "Fail")])
            .builtin("boom", &[("boom", "Boom")])
            .build();
        let catalog = BuiltinCatalog::new()
            .with("echo", |_| Ok(Box::new(EchoPackage::new("echo"))))
            .with("fail", |_| Ok(Box::new(FailingPackage::new("fail"))))
            .with("boom", |_| Ok(Box::new(PanickingPackage::new("boom"))));
        let loader = Arc::new(PackageLoader::new(home.packages_dir(), Arc::new(catalog)));
        Dispatcher::new(loader, ManifestStore::new(home.home().manifest_path()))
    }

    fn message(env: &Envelope) -> &str {
        env.message.as_deref().unwrap_or_default()
    }

    #[test]
    fn test_echo_success() {
        let home = TestHome::new();
        let env = setup(&home).dispatch("echo", "echo", json!({"a": 1}), &home.context());
        assert!(env.success);
        assert_eq!(env.data, Some(json!({"a": 1})));
        assert!(env.message.is_none());
    }

    #[test]
    fn test_empty_feature_rejected() {
        let home = TestHome::new();
        let env = setup(&home).dispatch("echo", " ", Value::Null, &home.context());
        assert!(!env.success);
        assert!(message(&env).starts_with("validation_failure:"));
    }

    #[test]
    fn test_unknown_feature() {
        let home = TestHome::new();
        let env = setup(&home).dispatch("echo", "shout", Value::Null, &home.context());
        assert!(!env.success);
        assert!(message(&env).starts_with("not_found:"));
        assert!(message(&env).contains("unknown feature 'shout'"));
    }

    #[test]
    fn test_unknown_package() {
        let home = TestHome::new();
        let env = setup(&home).dispatch("ghost", "x", Value::Null, &home.context());
        assert!(message(&env).starts_with("not_found:"));
    }

    #[test]
    fn test_non_object_args() {
        let home = TestHome::new();
        let env = setup(&home).dispatch("echo", "echo", json!([1, 2]), &home.context());
        assert!(!env.success);
        assert_eq!(
            message(&env),
            "validation_failure: args must be a JSON object, got array"
        );
    }

    #[test]
    fn test_null_args_become_empty_object() {
        let home = TestHome::new();
        let env = setup(&home).dispatch("echo", "echo", Value::Null, &home.context());
        assert_eq!(env.data, Some(json!({})));
    }

    #[test]
    fn test_error_is_execution_failure() {
        let home = TestHome::new();
        let env = setup(&home).dispatch("fail", "fail", Value::Null, &home.context());
        assert!(!env.success);
        assert!(message(&env).starts_with("execution_failure:"));
        assert!(message(&env).contains("fail is broken"));
        assert!(env.data.is_none());
    }

    #[test]
    fn test_panic_is_contained() {
        let home = TestHome::new();
        let dispatcher = setup(&home);
        let ctx = home.context();

        let env = dispatcher.dispatch("boom", "boom", Value::Null, &ctx);
        assert!(!env.success);
        assert!(message(&env).starts_with("execution_failure:"));
        assert!(message(&env).contains("package bug"));

        // The same dispatcher keeps serving other packages, and the same one.
        assert!(dispatcher.dispatch("echo", "echo", Value::Null, &ctx).success);
        assert!(!dispatcher.dispatch("boom", "boom", Value::Null, &ctx).success);
    }

    #[test]
    fn test_disabled_package_refused() {
        let home = TestHome::new();
        let dispatcher = setup(&home);
        let store = ManifestStore::new(home.home().manifest_path());
        let mut manifest = store.load();
        manifest.set_enabled("echo", false);
        store.save(&manifest).unwrap();

        let env = dispatcher.dispatch("echo", "echo", Value::Null, &home.context());
        assert_eq!(message(&env), "not_found: package 'echo' is disabled");

        let open = Dispatcher::without_manifest(Arc::clone(dispatcher.loader()));
        assert!(open.dispatch("echo", "echo", Value::Null, &home.context()).success);
    }
}
