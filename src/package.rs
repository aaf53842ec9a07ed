//! Package scanning: manifests, `.index.json` files and fallback resource scans

use crate::domain::{IndexEntry, PackageId, PackageInfo, ReferenceMetadata};
use crate::error::PackageError;
use crate::index::CanonicalIndex;
use crate::reference::generate_id;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Manifest file name at the root of every content package.
pub const MANIFEST_FILE: &str = "package.json";
/// Pre-built resource index file name.
pub const INDEX_FILE: &str = ".index.json";
/// Optional sub-directory holding example resources.
pub const EXAMPLES_DIR: &str = "examples";

/// FHIR package manifest (package.json) structure.
///
/// # Example
///
/// ```rust
/// use octofhir_canonical_index::package::PackageManifest;
///
/// let manifest: PackageManifest = serde_json::from_str(
///     r#"{"name": "hl7.fhir.us.core", "version": "6.1.0", "fhirVersions": ["4.0.1"]}"#,
/// )
/// .unwrap();
/// assert_eq!(manifest.fhir_versions, Some(vec!["4.0.1".to_string()]));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    #[serde(rename = "fhirVersions", default)]
    pub fhir_versions: Option<Vec<String>>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub canonical: Option<String>,
    #[serde(rename = "type", default)]
    pub package_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Parsed `.index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceIndexFile {
    #[serde(rename = "index-version")]
    pub index_version: u32,
    pub files: Vec<ResourceIndexFileEntry>,
}

/// One element of the `files` array in `.index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceIndexFileEntry {
    pub filename: String,
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    pub id: String,
    #[serde(default, deserialize_with = "present_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "present_string")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "present_string")]
    pub kind: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "present_string")]
    pub type_field: Option<String>,
}

/// Optional field that must be a string when present; `null` is rejected.
fn present_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    String::deserialize(deserializer).map(Some)
}

impl ResourceIndexFile {
    /// Parse and validate an index document.
    ///
    /// Any violation rejects the whole document: a missing or non-integer
    /// `index-version`, a missing `files` array, an element with an empty
    /// `filename`/`resourceType`/`id`, or a non-string (including `null`)
    /// optional field.
    pub fn parse(content: &str) -> Result<Self, String> {
        let index: Self = serde_json::from_str(content).map_err(|e| e.to_string())?;
        for (position, file) in index.files.iter().enumerate() {
            if file.filename.is_empty() || file.resource_type.is_empty() || file.id.is_empty() {
                return Err(format!(
                    "files[{position}] has an empty filename, resourceType or id"
                ));
            }
        }
        Ok(index)
    }
}

/// Result of one scan pass.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub index: CanonicalIndex,
    /// Advisory per-package warnings; empty unless warning collection is on.
    pub warnings: Vec<String>,
}

/// Walks an installed package tree and builds a [`CanonicalIndex`].
///
/// Scanning is best-effort: an unreadable directory, a malformed manifest or
/// an unparsable resource file skips only that directory or file.
#[derive(Debug, Clone, Default)]
pub struct PackageScanner {
    collect_warnings: bool,
}

impl PackageScanner {
    pub fn new(collect_warnings: bool) -> Self {
        Self { collect_warnings }
    }

    /// Scan every package under `root`.
    ///
    /// Package directories are visited in sorted name order, so insertion
    /// order in the resulting index is stable across runs and machines.
    #[tracing::instrument(name = "scanner.scan", skip_all, fields(root = %root.display()))]
    pub async fn scan(&self, root: &Path) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        let root = fs::canonicalize(root)
            .await
            .unwrap_or_else(|_| root.to_path_buf());

        for dir in package_dirs(&root).await {
            self.scan_package(&dir, &mut outcome).await;
        }

        info!(
            packages = outcome.index.packages.len(),
            urls = outcome.index.url_count(),
            entries = outcome.index.entry_count(),
            "scan complete"
        );
        outcome
    }

    async fn scan_package(&self, dir: &Path, outcome: &mut ScanOutcome) {
        let Some(content_dir) = package_content_dir(dir).await else {
            debug!(dir = %dir.display(), "no package manifest, skipping");
            return;
        };

        let manifest = match parse_manifest(&content_dir).await {
            Ok(manifest) => manifest,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping package");
                self.warn(outcome, dir.display(), e);
                return;
            }
        };

        let package = PackageId::new(&manifest.name, &manifest.version);
        debug!(package = %package, "scanning package");
        self.check_manifest(&package, &manifest, outcome);

        outcome.index.add_package(PackageInfo {
            id: package.clone(),
            path: content_dir.clone(),
            canonical: manifest.canonical.clone(),
            fhir_versions: manifest.fhir_versions.clone(),
        });

        let index_path = content_dir.join(INDEX_FILE);
        if path_exists(&index_path).await {
            self.index_from_file(&content_dir, &package, outcome).await;
        } else {
            self.warn(
                outcome,
                &package,
                PackageError::MissingIndex { path: index_path },
            );
            self.index_by_scanning(&content_dir, &package, &mut outcome.index)
                .await;
        }

        let examples = content_dir.join(EXAMPLES_DIR);
        if path_exists(&examples.join(INDEX_FILE)).await {
            self.index_from_file(&examples, &package, outcome).await;
        }
    }

    /// Index a directory from its `.index.json`. An invalid index leaves the
    /// directory unindexed.
    async fn index_from_file(&self, dir: &Path, package: &PackageId, outcome: &mut ScanOutcome) {
        let index_path = dir.join(INDEX_FILE);
        let parsed = match fs::read_to_string(&index_path).await {
            Ok(content) => ResourceIndexFile::parse(&content),
            Err(e) => Err(e.to_string()),
        };
        let index_file = match parsed {
            Ok(index_file) => index_file,
            Err(message) => {
                debug!(path = %index_path.display(), %message, "invalid resource index");
                self.warn(
                    outcome,
                    package,
                    PackageError::InvalidIndex {
                        path: index_path,
                        message,
                    },
                );
                return;
            }
        };

        for file in index_file.files {
            let Some(url) = file.url.filter(|u| !u.is_empty()) else {
                continue;
            };
            let file_path = dir.join(&file.filename);
            let id = generate_id(&package.name, &package.version, &file_path);

            outcome.index.references.set(
                id.clone(),
                ReferenceMetadata {
                    package_name: package.name.clone(),
                    package_version: package.version.clone(),
                    file_path,
                    resource_type: file.resource_type.clone(),
                    url: Some(url.clone()),
                    version: file.version.clone(),
                },
            );
            outcome.index.add_entry(
                url.clone(),
                IndexEntry {
                    id,
                    resource_type: file.resource_type,
                    index_version: index_file.index_version,
                    kind: file.kind,
                    url: Some(url),
                    type_: file.type_field,
                    version: file.version,
                    package: Some(package.clone()),
                },
            );
        }
    }

    /// Index every top-level JSON resource that carries both `resourceType`
    /// and `url`. Entries get `index_version = 0`.
    async fn index_by_scanning(&self, dir: &Path, package: &PackageId, index: &mut CanonicalIndex) {
        for file_path in sorted_json_files(dir).await {
            let Ok(content) = fs::read_to_string(&file_path).await else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
                debug!(path = %file_path.display(), "unparsable resource, skipping");
                continue;
            };

            let str_field = |field: &str| {
                value
                    .get(field)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            };
            let (Some(resource_type), Some(url)) = (str_field("resourceType"), str_field("url"))
            else {
                continue;
            };
            let version = str_field("version");
            let id = generate_id(&package.name, &package.version, &file_path);

            index.references.set(
                id.clone(),
                ReferenceMetadata {
                    package_name: package.name.clone(),
                    package_version: package.version.clone(),
                    file_path: file_path.clone(),
                    resource_type: resource_type.clone(),
                    url: Some(url.clone()),
                    version: version.clone(),
                },
            );
            index.add_entry(
                url.clone(),
                IndexEntry {
                    id,
                    resource_type,
                    index_version: 0,
                    kind: str_field("kind"),
                    url: Some(url),
                    type_: str_field("type"),
                    version,
                    package: Some(package.clone()),
                },
            );
        }
    }

    fn check_manifest(
        &self,
        package: &PackageId,
        manifest: &PackageManifest,
        outcome: &mut ScanOutcome,
    ) {
        if !self.collect_warnings {
            return;
        }
        if manifest.fhir_versions.as_ref().is_none_or(Vec::is_empty) {
            outcome
                .warnings
                .push(format!("{package}: manifest does not declare fhirVersions"));
        }
        if !is_core_package(&manifest.name)
            && !manifest.dependencies.keys().any(|dep| is_core_package(dep))
        {
            outcome
                .warnings
                .push(format!("{package}: no dependency on a FHIR core package"));
        }
    }

    fn warn(&self, outcome: &mut ScanOutcome, subject: impl std::fmt::Display, error: PackageError) {
        if self.collect_warnings {
            outcome.warnings.push(format!("{subject}: {error}"));
        }
    }
}

/// Read `package.json` from a package content directory.
pub async fn parse_manifest(dir: &Path) -> Result<PackageManifest, PackageError> {
    let path = dir.join(MANIFEST_FILE);
    let content = fs::read_to_string(&path)
        .await
        .map_err(|_| PackageError::MissingManifest {
            path: dir.to_path_buf(),
        })?;
    serde_json::from_str(&content).map_err(|e| PackageError::InvalidManifest {
        path,
        message: e.to_string(),
    })
}

/// True for the FHIR core packages (`hl7.fhir.r4.core`, `hl7.fhir.r4b.core`, ...).
pub fn is_core_package(name: &str) -> bool {
    name.strip_prefix("hl7.fhir.r")
        .and_then(|rest| rest.strip_suffix(".core"))
        .is_some_and(|release| {
            !release.is_empty() && release.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

/// Candidate package directories under `root`, sorted by name.
///
/// Immediate sub-directories, descending once into `@scope` directories.
pub async fn package_dirs(root: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for dir in sorted_subdirs(root).await {
        let is_scope = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('@'));
        if is_scope {
            candidates.extend(sorted_subdirs(&dir).await);
        } else {
            candidates.push(dir);
        }
    }
    candidates
}

/// Directory holding the manifest: the directory itself, or its `package/`
/// child for the tarball layout.
pub async fn package_content_dir(dir: &Path) -> Option<PathBuf> {
    if path_exists(&dir.join(MANIFEST_FILE)).await {
        return Some(dir.to_path_buf());
    }
    let nested = dir.join("package");
    if path_exists(&nested.join(MANIFEST_FILE)).await {
        return Some(nested);
    }
    None
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return dirs;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    dirs
}

async fn sorted_json_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return files;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name == MANIFEST_FILE || name == INDEX_FILE {
            continue;
        }
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        if is_json && entry.file_type().await.is_ok_and(|t| t.is_file()) {
            files.push(path);
        }
    }
    files.sort();
    files
}
