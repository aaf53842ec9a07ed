//! Test helper functions and utilities

use crate::common::fixtures::create_sample_package_manifest;
use octofhir_canonical_index::{FcmConfig, RegistryConfig, ScanConfig, StorageConfig};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a test configuration for testing
pub fn create_test_config(temp_dir: &Path) -> FcmConfig {
    FcmConfig {
        packages: vec![],
        registry: RegistryConfig::default(),
        storage: StorageConfig {
            working_dir: temp_dir.to_path_buf(),
            cache_dir: Some(temp_dir.join("cache")),
            packages_dir: Some(temp_dir.join("packages")),
        },
        scan: ScanConfig {
            collect_warnings: true,
        },
    }
}

/// Setup test directories and return temporary directory
pub fn setup_test_env() -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    std::fs::create_dir_all(temp_dir.path().join("packages")).unwrap();
    temp_dir
}

/// Assert that a path exists
pub fn assert_path_exists(path: &Path) {
    assert!(path.exists(), "Path should exist: {}", path.display());
}

/// Builder for an installed package directory on disk.
pub struct TestPackage {
    dir: PathBuf,
    manifest: Value,
    resources: Vec<(String, Value)>,
    examples: Vec<(String, Value)>,
    write_index: bool,
}

impl TestPackage {
    pub fn new(packages_dir: &Path, name: &str, version: &str) -> Self {
        Self {
            dir: packages_dir.join(name),
            manifest: create_sample_package_manifest(name, version),
            resources: Vec::new(),
            examples: Vec::new(),
            write_index: true,
        }
    }

    /// Place the package somewhere other than `<packages_dir>/<name>`.
    pub fn at(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn manifest(mut self, manifest: Value) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn resource(mut self, filename: &str, content: Value) -> Self {
        self.resources.push((filename.to_string(), content));
        self
    }

    pub fn example(mut self, filename: &str, content: Value) -> Self {
        self.examples.push((filename.to_string(), content));
        self
    }

    /// Skip writing `.index.json`, forcing a fallback scan.
    pub fn without_index(mut self) -> Self {
        self.write_index = false;
        self
    }

    pub fn write(self) -> PathBuf {
        std::fs::create_dir_all(&self.dir).unwrap();
        write_json(&self.dir.join("package.json"), &self.manifest);
        for (filename, content) in &self.resources {
            write_json(&self.dir.join(filename), content);
        }
        if self.write_index {
            write_json(&self.dir.join(".index.json"), &index_file(&self.resources));
        }

        if !self.examples.is_empty() {
            let examples_dir = self.dir.join("examples");
            std::fs::create_dir_all(&examples_dir).unwrap();
            for (filename, content) in &self.examples {
                write_json(&examples_dir.join(filename), content);
            }
            write_json(&examples_dir.join(".index.json"), &index_file(&self.examples));
        }

        self.dir
    }
}

/// `.index.json` content describing `resources`.
pub fn index_file(resources: &[(String, Value)]) -> Value {
    let files: Vec<Value> = resources
        .iter()
        .map(|(filename, content)| {
            let mut entry = json!({
                "filename": filename,
                "resourceType": content["resourceType"],
                "id": content["id"],
            });
            for field in ["url", "version", "kind", "type"] {
                if let Some(value) = content.get(field) {
                    entry[field] = value.clone();
                }
            }
            entry
        })
        .collect();
    json!({"index-version": 1, "files": files})
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}
