//! Cache key and snapshot store tests

use crate::common::fixtures::*;
use crate::common::{TestPackage, setup_test_env};
use octofhir_canonical_index::{
    CacheStore, PackageScanner, cache_key_for_specs, compute_cache_key,
};

fn specs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_cache_key_ignores_spec_order() {
    let a = cache_key_for_specs(&specs(&["hl7.fhir.r4.core@4.0.1", "hl7.fhir.us.core@6.1.0"]));
    let b = cache_key_for_specs(&specs(&["hl7.fhir.us.core@6.1.0", "hl7.fhir.r4.core@4.0.1"]));
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);

    let c = cache_key_for_specs(&specs(&["hl7.fhir.r4.core@4.0.1"]));
    assert_ne!(a, c);
}

#[tokio::test]
async fn test_local_spec_content_changes_key() {
    let temp_dir = setup_test_env();
    let ig = TestPackage::new(temp_dir.path(), "my.ig", "0.1.0")
        .resource(
            "ValueSet-a.json",
            create_sample_value_set("a", "http://example.org/ValueSet/a"),
        )
        .write();
    let specs = specs(&["hl7.fhir.r4.core", "file:./my.ig"]);

    let first = compute_cache_key(&specs, temp_dir.path()).await.unwrap();
    let again = compute_cache_key(&specs, temp_dir.path()).await.unwrap();
    assert_eq!(first, again);

    std::fs::write(ig.join("ValueSet-a.json"), "{}").unwrap();
    let changed = compute_cache_key(&specs, temp_dir.path()).await.unwrap();
    assert_ne!(first, changed);
}

#[tokio::test]
async fn test_snapshot_round_trip_preserves_order() {
    let temp_dir = setup_test_env();
    let packages_dir = temp_dir.path().join("packages");
    for name in ["pkg.b", "pkg.a"] {
        TestPackage::new(&packages_dir, name, "1.0.0")
            .resource(
                "StructureDefinition-patient.json",
                create_sample_structure_definition("patient", "http://example.org/Patient"),
            )
            .write();
    }
    let index = PackageScanner::default().scan(&packages_dir).await.index;

    let store = CacheStore::new(temp_dir.path().join("cache"));
    store.save(&index, "abc123").await.unwrap();
    assert!(store.snapshot_path("abc123").exists());

    let loaded = store.load("abc123").await.unwrap();
    assert_eq!(loaded, index);
    let ids = loaded.references.ids_by_url("http://example.org/Patient");
    assert_eq!(ids.len(), 2);
    assert_eq!(
        loaded.references.get(&ids[0]).unwrap().package_name,
        "pkg.a"
    );
}

#[tokio::test]
async fn test_load_rejects_missing_corrupt_and_foreign_snapshots() {
    let temp_dir = setup_test_env();
    let store = CacheStore::new(temp_dir.path().join("cache"));
    assert!(store.load("nothing").await.is_none());

    std::fs::create_dir_all(store.dir()).unwrap();
    std::fs::write(store.snapshot_path("corrupt"), "{ nope").unwrap();
    assert!(store.load("corrupt").await.is_none());

    let index = PackageScanner::default()
        .scan(&temp_dir.path().join("packages"))
        .await
        .index;
    store.save(&index, "key-one").await.unwrap();
    std::fs::copy(store.snapshot_path("key-one"), store.snapshot_path("key-two")).unwrap();
    assert!(store.load("key-two").await.is_none());
    assert!(store.load("key-one").await.is_some());
}

#[tokio::test]
async fn test_flush_removes_snapshots() {
    let temp_dir = setup_test_env();
    let store = CacheStore::new(temp_dir.path().join("cache"));
    let index = PackageScanner::default()
        .scan(&temp_dir.path().join("packages"))
        .await
        .index;
    store.save(&index, "one").await.unwrap();
    store.save(&index, "two").await.unwrap();

    assert_eq!(store.flush().await.unwrap(), 2);
    assert!(store.load("one").await.is_none());
    assert_eq!(store.flush().await.unwrap(), 0);
}
