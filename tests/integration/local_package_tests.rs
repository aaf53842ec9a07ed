//! Local (file:) package flow tests

use crate::common::fixtures::*;
use crate::common::{TestPackage, assert_path_exists, create_test_config, setup_test_env, write_json};
use octofhir_canonical_index::{CanonicalManager, ResolveOptions, SearchParams};
use serde_json::json;

const PROFILE: &str = "http://example.org/my-ig/StructureDefinition/profile";

#[tokio::test]
async fn test_local_package_is_installed_and_indexed() {
    let temp_dir = setup_test_env();
    let source = TestPackage::new(temp_dir.path(), "my.ig", "0.1.0")
        .at(temp_dir.path().join("my-ig"))
        .resource(
            "StructureDefinition-profile.json",
            create_sample_structure_definition("profile", PROFILE),
        )
        .without_index()
        .write();
    std::fs::create_dir_all(source.join("node_modules")).unwrap();

    let mut config = create_test_config(temp_dir.path());
    config.packages = vec!["file:./my-ig".to_string()];
    let packages_dir = config.storage.packages_dir();
    let manager = CanonicalManager::new(config).unwrap();

    let packages = manager.init().await.unwrap();
    assert_eq!(packages["my.ig"].version, "0.1.0");
    assert_path_exists(&packages_dir.join("my.ig").join("package.json"));
    assert!(!packages_dir.join("my.ig").join("node_modules").exists());

    let entry = manager
        .resolve_entry(PROFILE, &ResolveOptions::default())
        .unwrap();
    assert_eq!(entry.index_version, 0);

    let resource = manager
        .resolve(PROFILE, &ResolveOptions::default())
        .await
        .unwrap();
    assert_eq!(resource.resource_type, "StructureDefinition");

    let warnings = manager.warnings().unwrap();
    assert!(warnings.iter().any(|w| w.contains(".index.json")));
}

#[tokio::test]
async fn test_editing_local_package_invalidates_cache() {
    let temp_dir = setup_test_env();
    let source = TestPackage::new(temp_dir.path(), "my.ig", "0.1.0")
        .at(temp_dir.path().join("my-ig"))
        .resource(
            "StructureDefinition-profile.json",
            create_sample_structure_definition("profile", PROFILE),
        )
        .write();

    let mut config = create_test_config(temp_dir.path());
    config.packages = vec!["file:./my-ig".to_string()];

    let first = CanonicalManager::new(config.clone()).unwrap();
    first.init().await.unwrap();
    let first_key = first.cache_key().unwrap();

    let mut added = create_sample_value_set("added", "http://example.org/my-ig/ValueSet/added");
    added["version"] = json!("0.1.0");
    let resources = vec![
        (
            "StructureDefinition-profile.json".to_string(),
            create_sample_structure_definition("profile", PROFILE),
        ),
        ("ValueSet-added.json".to_string(), added.clone()),
    ];
    write_json(&source.join("ValueSet-added.json"), &added);
    write_json(
        &source.join(".index.json"),
        &crate::common::index_file(&resources),
    );

    let second = CanonicalManager::new(config).unwrap();
    second.init().await.unwrap();
    assert_ne!(second.cache_key().unwrap(), first_key);
    assert_eq!(
        second
            .search_entries(&SearchParams::default().with_package("my.ig"))
            .unwrap()
            .len(),
        2
    );
}
