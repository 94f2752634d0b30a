//! Discovery and manifest round-trips against a real package root.

use std::sync::Arc;

use suite_package::{BuiltinCatalog, ManifestStore, PackageRegistry};
use suite_test::{PackageRootBuilder, TestHome, init_test_tracing};

fn registry(home: &TestHome) -> PackageRegistry {
    PackageRegistry::open(
        home.packages_dir(),
        ManifestStore::new(home.home().manifest_path()),
        Arc::new(BuiltinCatalog::new()),
    )
    .unwrap()
}

#[test]
fn one_valid_package_and_one_invalid_directory() {
    init_test_tracing();
    let home = TestHome::new();
    PackageRootBuilder::new(home.packages_dir())
        .builtin("fs", &[("disk_space", "Disk Space")])
        .empty_dir("no_metadata")
        .build();

    let found = registry(&home).discover();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "fs");
    assert_eq!(found[0].features.len(), 1);
    assert_eq!(found[0].features[0].id, "disk_space");

    let manifest = ManifestStore::new(home.home().manifest_path()).load();
    assert_eq!(manifest.packages.len(), 1);
    assert_eq!(manifest.packages[0].meta.id, "fs");
    assert!(manifest.packages[0].enabled);
    assert!(manifest.updated_at > 0);
}

#[test]
fn discovered_ids_round_trip_through_manifest() {
    init_test_tracing();
    let home = TestHome::new();
    PackageRootBuilder::new(home.packages_dir())
        .builtin("zeta", &[("z", "Z")])
        .builtin("alpha", &[("a", "A")])
        .legacy("legacy", r#"{"name": "Legacy", "version": "3"}"#)
        .build();

    let discovered = registry(&home).discover();
    let persisted = ManifestStore::new(home.home().manifest_path()).load();

    let discovered_ids: Vec<_> = discovered.iter().map(|m| m.id.as_str()).collect();
    let persisted_ids: Vec<_> = persisted.packages.iter().map(|e| e.meta.id.as_str()).collect();
    assert_eq!(discovered_ids, ["alpha", "legacy", "zeta"]);
    assert_eq!(discovered_ids, persisted_ids);

    for (meta, entry) in discovered.iter().zip(&persisted.packages) {
        assert_eq!(meta, &entry.meta);
        assert_eq!(
            home.packages_dir().join(&meta.id).file_name().and_then(|n| n.to_str()),
            Some(meta.id.as_str())
        );
    }
}

#[test]
fn manifest_file_has_documented_shape() {
    let home = TestHome::new();
    PackageRootBuilder::new(home.packages_dir())
        .builtin("fs", &[("disk_space", "Disk Space")])
        .build();
    registry(&home).discover();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(home.home().manifest_path()).unwrap())
            .unwrap();
    assert!(raw["updated_at"].is_i64());
    let entry = &raw["packages"][0];
    assert_eq!(entry["id"], "fs");
    assert_eq!(entry["name"], "fs");
    assert_eq!(entry["version"], "0.0");
    assert_eq!(entry["description"], "");
    assert_eq!(entry["enabled"], true);
    assert_eq!(entry["features"][0]["id"], "disk_space");
}
