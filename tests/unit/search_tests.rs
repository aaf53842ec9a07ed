//! Search engine tests

use crate::common::fixtures::*;
use crate::common::{TestPackage, setup_test_env};
use octofhir_canonical_index::{
    CanonicalResolver, PackageScanner, SearchEngine, SearchParameterInfo, SearchParams,
    SmartSearchFilters,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

async fn engine(packages_dir: &Path) -> SearchEngine {
    let mut extension = create_sample_structure_definition(
        "birthplace",
        "http://example.org/StructureDefinition/patient-birthPlace",
    );
    extension["type"] = json!("Extension");
    extension["kind"] = json!("complex-type");

    TestPackage::new(packages_dir, "pkg.core", "4.0.1")
        .resource(
            "StructureDefinition-Patient.json",
            create_sample_structure_definition(
                "Patient",
                "http://hl7.org/fhir/StructureDefinition/Patient",
            ),
        )
        .resource(
            "ValueSet-gender.json",
            create_sample_value_set("gender", "http://hl7.org/fhir/ValueSet/administrative-gender"),
        )
        .resource(
            "SearchParameter-patient-name.json",
            create_sample_search_parameter("patient-name", "name", &["Patient"], "string"),
        )
        .resource(
            "SearchParameter-individual-Birthdate.json",
            create_sample_search_parameter(
                "individual-Birthdate",
                "Birthdate",
                &["Patient", "Person"],
                "date",
            ),
        )
        .resource(
            "SearchParameter-obs-code.json",
            create_sample_search_parameter("obs-code", "code", &["Observation"], "token"),
        )
        .write();
    TestPackage::new(packages_dir, "pkg.ext", "1.0.0")
        .resource("StructureDefinition-birthplace.json", extension)
        .write();

    let index = PackageScanner::default().scan(packages_dir).await.index;
    SearchEngine::new(CanonicalResolver::new(Arc::new(index)))
}

#[tokio::test]
async fn test_search_entries_filters() {
    let temp_dir = setup_test_env();
    let engine = engine(&temp_dir.path().join("packages")).await;

    assert_eq!(engine.search_entries(&SearchParams::default()).len(), 6);
    assert_eq!(
        engine
            .search_entries(&SearchParams::default().with_kind("resource"))
            .len(),
        1
    );
    assert_eq!(
        engine
            .search_entries(&SearchParams::default().with_package("pkg.ext"))
            .len(),
        1
    );
    let by_url = engine.search_entries(
        &SearchParams::default().with_url("http://hl7.org/fhir/StructureDefinition/Patient"),
    );
    assert_eq!(by_url.len(), 1);
    assert!(
        engine
            .search_entries(&SearchParams::default().with_url("http://nowhere.org/x"))
            .is_empty()
    );
}

#[tokio::test]
async fn test_search_reads_matches() {
    let temp_dir = setup_test_env();
    let engine = engine(&temp_dir.path().join("packages")).await;

    let resources = engine
        .search(&SearchParams::default().with_type("Extension"))
        .await
        .unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].content["id"], "birthplace");
}

#[tokio::test]
async fn test_smart_search_terms_and_abbreviations() {
    let temp_dir = setup_test_env();
    let engine = engine(&temp_dir.path().join("packages")).await;
    let no_filters = SmartSearchFilters::default();

    let sd = engine.smart_search(&["sd"], &no_filters);
    assert_eq!(sd.len(), 2);
    assert!(sd.iter().all(|e| e.resource_type == "StructureDefinition"));

    let patient_sd = engine.smart_search(&["patient", "sd"], &no_filters);
    assert_eq!(patient_sd.len(), 2);

    let vs = engine.smart_search(&["vs", "gender"], &no_filters);
    assert_eq!(vs.len(), 1);

    assert!(engine.smart_search(&["xyz123"], &no_filters).is_empty());
    assert_eq!(engine.smart_search::<&str>(&[], &no_filters).len(), 6);

    let filtered = engine.smart_search(
        &["patient"],
        &SmartSearchFilters {
            resource_type: Some("StructureDefinition".to_string()),
            type_: Some("Extension".to_string()),
            ..SmartSearchFilters::default()
        },
    );
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].package.as_ref().unwrap().name, "pkg.ext");
}

#[tokio::test]
async fn test_search_parameters_sorted_by_code() {
    let temp_dir = setup_test_env();
    let engine = engine(&temp_dir.path().join("packages")).await;

    let params = engine.search_parameters_for_resource("Patient").await.unwrap();
    let codes: Vec<_> = params
        .iter()
        .map(|p| p.content["code"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(codes, vec!["Birthdate", "name"]);

    let infos: Vec<_> = params.iter().map(SearchParameterInfo::from_resource).collect();
    assert_eq!(infos[0].type_field, "date");
    assert_eq!(infos[0].base, vec!["Patient", "Person"]);

    assert!(
        engine
            .search_parameters_for_resource("Encounter")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_search_parameter_memo_survives_file_removal() {
    let temp_dir = setup_test_env();
    let packages_dir = temp_dir.path().join("packages");
    let engine = engine(&packages_dir).await;

    let first = engine.search_parameters_for_resource("Patient").await.unwrap();
    assert_eq!(engine.memoized_resource_types(), vec!["Patient"]);

    std::fs::remove_file(
        packages_dir
            .join("pkg.core")
            .join("SearchParameter-patient-name.json"),
    )
    .unwrap();
    let second = engine.search_parameters_for_resource("Patient").await.unwrap();
    assert_eq!(first.len(), second.len());

    engine.clear_memo();
    assert!(engine.memoized_resource_types().is_empty());
    assert!(engine.search_parameters_for_resource("Patient").await.is_err());
}
