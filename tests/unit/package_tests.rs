//! Package scanning tests

use crate::common::fixtures::*;
use crate::common::{TestPackage, setup_test_env, write_json};
use octofhir_canonical_index::{PackageId, PackageScanner};
use serde_json::json;

#[tokio::test]
async fn test_prebuilt_index_and_examples() {
    let temp_dir = setup_test_env();
    let packages_dir = temp_dir.path().join("packages");
    TestPackage::new(&packages_dir, "pkg.a", "1.0.0")
        .resource(
            "StructureDefinition-a.json",
            create_sample_structure_definition("a", "http://example.org/StructureDefinition/a"),
        )
        .resource(
            "ValueSet-a.json",
            create_sample_value_set("a", "http://example.org/ValueSet/a"),
        )
        .example(
            "StructureDefinition-a-example.json",
            create_sample_structure_definition("a-ex", "http://example.org/StructureDefinition/a-ex"),
        )
        .write();

    let outcome = PackageScanner::new(true).scan(&packages_dir).await;
    let index = outcome.index;

    assert_eq!(index.packages.len(), 1);
    assert_eq!(index.url_count(), 3);
    assert_eq!(index.references.size(), 3);

    let entry = &index
        .entries_for("http://example.org/StructureDefinition/a")
        .unwrap()[0];
    assert_eq!(entry.index_version, 1);
    assert_eq!(entry.kind.as_deref(), Some("resource"));
    assert_eq!(entry.type_.as_deref(), Some("Patient"));
    assert_eq!(entry.package, Some(PackageId::new("pkg.a", "1.0.0")));

    let example = &index
        .entries_for("http://example.org/StructureDefinition/a-ex")
        .unwrap()[0];
    let meta = index.references.get(&example.id).unwrap();
    assert!(meta.file_path.ends_with("examples/StructureDefinition-a-example.json"));
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
}

#[tokio::test]
async fn test_fallback_scan_indexes_top_level_resources() {
    let temp_dir = setup_test_env();
    let packages_dir = temp_dir.path().join("packages");
    let dir = TestPackage::new(&packages_dir, "pkg.plain", "0.1.0")
        .resource(
            "CodeSystem-status.json",
            create_sample_code_system("status", "http://example.org/CodeSystem/status"),
        )
        .resource("Patient-example.json", create_sample_patient("example"))
        .without_index()
        .write();
    std::fs::write(dir.join("broken.json"), "{ not json").unwrap();
    std::fs::create_dir_all(dir.join("nested")).unwrap();
    write_json(
        &dir.join("nested").join("ValueSet-deep.json"),
        &create_sample_value_set("deep", "http://example.org/ValueSet/deep"),
    );

    let outcome = PackageScanner::new(true).scan(&packages_dir).await;
    let index = outcome.index;

    assert_eq!(index.url_count(), 1);
    let entry = &index
        .entries_for("http://example.org/CodeSystem/status")
        .unwrap()[0];
    assert_eq!(entry.index_version, 0);
    assert_eq!(entry.resource_type, "CodeSystem");
    assert!(index.entries_for("http://example.org/ValueSet/deep").is_none());
    assert!(
        outcome
            .warnings
            .iter()
            .any(|w| w.contains("pkg.plain@0.1.0") && w.contains(".index.json"))
    );
}

#[tokio::test]
async fn test_invalid_index_file_is_not_rescanned() {
    let temp_dir = setup_test_env();
    let packages_dir = temp_dir.path().join("packages");
    let dir = TestPackage::new(&packages_dir, "pkg.bad", "1.0.0")
        .resource(
            "ValueSet-a.json",
            create_sample_value_set("a", "http://example.org/ValueSet/a"),
        )
        .without_index()
        .write();
    write_json(
        &dir.join(".index.json"),
        &json!({
            "index-version": 1,
            "files": [{"filename": "", "resourceType": "ValueSet", "id": "a"}]
        }),
    );

    let outcome = PackageScanner::new(true).scan(&packages_dir).await;

    assert_eq!(outcome.index.packages.len(), 1);
    assert_eq!(outcome.index.url_count(), 0);
    assert!(!outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_scoped_and_tarball_layouts() {
    let temp_dir = setup_test_env();
    let packages_dir = temp_dir.path().join("packages");
    TestPackage::new(&packages_dir, "@acme/profiles", "2.0.0")
        .at(packages_dir.join("@acme").join("profiles"))
        .resource(
            "StructureDefinition-x.json",
            create_sample_structure_definition("x", "http://acme.org/StructureDefinition/x"),
        )
        .write();
    TestPackage::new(&packages_dir, "tarball.pkg", "3.0.0")
        .at(packages_dir.join("tarball.pkg").join("package"))
        .resource(
            "ValueSet-t.json",
            create_sample_value_set("t", "http://example.org/ValueSet/t"),
        )
        .write();

    let index = PackageScanner::default().scan(&packages_dir).await.index;

    assert_eq!(index.packages.len(), 2);
    assert!(index.packages.contains_key("@acme/profiles"));
    assert!(index.packages["tarball.pkg"].path.ends_with("tarball.pkg/package"));
    assert!(index.entries_for("http://acme.org/StructureDefinition/x").is_some());
    assert!(index.entries_for("http://example.org/ValueSet/t").is_some());
}

#[tokio::test]
async fn test_manifest_warnings() {
    let temp_dir = setup_test_env();
    let packages_dir = temp_dir.path().join("packages");
    TestPackage::new(&packages_dir, "pkg.loose", "1.0.0")
        .manifest(json!({"name": "pkg.loose", "version": "1.0.0"}))
        .write();

    let outcome = PackageScanner::new(true).scan(&packages_dir).await;
    assert!(outcome.warnings.iter().any(|w| w.contains("fhirVersions")));
    assert!(outcome.warnings.iter().any(|w| w.contains("core package")));

    let quiet = PackageScanner::new(false).scan(&packages_dir).await;
    assert!(quiet.warnings.is_empty());
    assert_eq!(quiet.index.packages.len(), 1);
}

#[tokio::test]
async fn test_duplicate_urls_keep_sorted_package_order() {
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
    let packages: Vec<_> = index
        .entries_for("http://example.org/Patient")
        .unwrap()
        .iter()
        .map(|e| e.package.as_ref().unwrap().name.clone())
        .collect();
    assert_eq!(packages, vec!["pkg.a", "pkg.b"]);
}

#[tokio::test]
async fn test_missing_root_yields_empty_index() {
    let temp_dir = setup_test_env();
    let outcome = PackageScanner::new(true)
        .scan(&temp_dir.path().join("does-not-exist"))
        .await;
    assert_eq!(outcome.index.packages.len(), 0);
    assert_eq!(outcome.index.entry_count(), 0);
}

#[tokio::test]
async fn test_null_optional_field_invalidates_index() {
    let temp_dir = setup_test_env();
    let packages_dir = temp_dir.path().join("packages");
    let dir = TestPackage::new(&packages_dir, "pkg.nulls", "1.0.0")
        .resource(
            "ValueSet-a.json",
            create_sample_value_set("a", "http://example.org/ValueSet/a"),
        )
        .resource(
            "ValueSet-b.json",
            create_sample_value_set("b", "http://example.org/ValueSet/b"),
        )
        .without_index()
        .write();
    write_json(
        &dir.join(".index.json"),
        &json!({
            "index-version": 1,
            "files": [
                {"filename": "ValueSet-a.json", "resourceType": "ValueSet", "id": "a", "url": "http://example.org/ValueSet/a"},
                {"filename": "ValueSet-b.json", "resourceType": "ValueSet", "id": "b", "url": "http://example.org/ValueSet/b", "kind": null}
            ]
        }),
    );

    let outcome = PackageScanner::new(true).scan(&packages_dir).await;

    assert_eq!(outcome.index.url_count(), 0);
    assert!(
        outcome
            .warnings
            .iter()
            .any(|w| w.contains("Invalid resource index"))
    );
}
