//! End-to-end dispatch through registry, loader and dispatcher.

use std::sync::Arc;

use serde_json::{Map, Value, json};

use suite_core::{CapabilityContext, Envelope, FeaturePackage, PackageMetadata};
use suite_package::{BuiltinCatalog, Dispatcher, ManifestStore, PackageLoader, PackageRegistry};
use suite_test::{PackageRootBuilder, PanickingPackage, TestHome, init_test_tracing};

/// Stand-in for the disk scanner: answers with a conforming envelope.
struct StubDiskSpace {
    meta: PackageMetadata,
}

impl FeaturePackage for StubDiskSpace {
    fn meta(&self) -> &PackageMetadata {
        &self.meta
    }

    fn run(
        &self,
        _feature_id: &str,
        _args: &Map<String, Value>,
        _ctx: &CapabilityContext,
    ) -> anyhow::Result<Value> {
        Ok(json!({"success": true, "data": [], "message": null}))
    }
}

fn catalog() -> BuiltinCatalog {
    BuiltinCatalog::new()
        .with("fs", |_| {
            Ok(Box::new(StubDiskSpace {
                meta: PackageMetadata::new("fs").with_feature("disk_space", "Disk Space"),
            }))
        })
        .with("boom", |_| Ok(Box::new(PanickingPackage::new("boom"))))
}

fn dispatcher(home: &TestHome) -> Dispatcher {
    PackageRootBuilder::new(home.packages_dir())
        .builtin("fs", &[("disk_space", "Disk Space")])
        .builtin("boom", &[("boom", "Boom")])
        .build();
    let loader = Arc::new(PackageLoader::new(home.packages_dir(), Arc::new(catalog())));
    Dispatcher::new(loader, ManifestStore::new(home.home().manifest_path()))
}

#[test]
fn conforming_envelope_passes_through_unchanged() {
    init_test_tracing();
    let home = TestHome::new();

    let env = dispatcher(&home).dispatch("fs", "disk_space", json!({"path": "/tmp"}), &home.context());

    assert_eq!(env, Envelope::success(json!([])));
    assert_eq!(
        serde_json::to_value(&env).unwrap(),
        json!({"success": true, "data": [], "message": null})
    );
}

#[test]
fn failing_dispatch_does_not_affect_the_next_one() {
    init_test_tracing();
    let home = TestHome::new();
    let dispatcher = dispatcher(&home);
    let ctx = home.context();

    let failed = dispatcher.dispatch("boom", "boom", Value::Null, &ctx);
    let ok = dispatcher.dispatch("fs", "disk_space", json!({"path": "/tmp"}), &ctx);

    assert!(!failed.success);
    assert!(failed.message.is_some());
    assert!(ok.success);
}

#[test]
fn unknown_feature_never_raises() {
    let home = TestHome::new();
    let env = dispatcher(&home).dispatch("fs", "defrag", Value::Null, &home.context());
    assert!(!env.success);
    assert!(env.message.unwrap().contains("unknown feature"));
}

#[test]
fn disabling_through_registry_blocks_dispatch() {
    let home = TestHome::new();
    let dispatcher = dispatcher(&home);
    let registry = PackageRegistry::open(
        home.packages_dir(),
        ManifestStore::new(home.home().manifest_path()),
        Arc::new(catalog()),
    )
    .unwrap();
    registry.discover();

    assert!(registry.enable_package("fs", false));
    let env = dispatcher.dispatch("fs", "disk_space", Value::Null, &home.context());
    assert_eq!(env.message.as_deref(), Some("not_found: package 'fs' is disabled"));

    assert!(registry.enable_package("fs", true));
    assert!(dispatcher.dispatch("fs", "disk_space", Value::Null, &home.context()).success);
}
