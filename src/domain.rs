//! Domain types: packages, references, index entries and resources

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Identifies one installed content package. Uniqueness is `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// One installed package as seen by the scanner.
///
/// Registered as soon as a manifest is read, even when the package turns out
/// to hold no indexable resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub id: PackageId,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_versions: Option<Vec<String>>,
}

/// Location metadata for one physical resource file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceMetadata {
    pub package_name: String,
    pub package_version: String,
    pub file_path: PathBuf,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Lightweight stand-in for a resource, keyed by canonical URL in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Reference id of the backing file.
    pub id: String,
    pub resource_type: String,
    /// `0` when derived by a fallback scan, otherwise the `index-version` of
    /// the `.index.json` the entry came from.
    pub index_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageId>,
}

impl IndexEntry {
    /// Handle that can be passed to `read` to load the full resource.
    pub fn reference(&self) -> Reference {
        Reference {
            id: self.id.clone(),
            resource_type: self.resource_type.clone(),
        }
    }
}

/// Content-addressed handle to a resource file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: String,
    pub resource_type: String,
}

impl From<&IndexEntry> for Reference {
    fn from(entry: &IndexEntry) -> Self {
        entry.reference()
    }
}

/// A resource loaded from disk.
///
/// The handful of fields the engine inspects are lifted out; everything else
/// stays in `content` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirResource {
    /// Reference id the resource was read through.
    pub id: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub content: Value,
}

impl FhirResource {
    pub fn new(reference: &Reference, content: Value) -> Self {
        let url = content
            .get("url")
            .and_then(|v| v.as_str())
            .map(String::from);
        let version = content
            .get("version")
            .and_then(|v| v.as_str())
            .map(String::from);
        Self {
            id: reference.id.clone(),
            resource_type: reference.resource_type.clone(),
            url,
            version,
            content,
        }
    }

    /// String field from the opaque content.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.content.get(field).and_then(|v| v.as_str())
    }
}

/// Canonical with optional version using `url|version` syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalWithVersion {
    pub canonical: String,
    pub version: Option<String>,
}

impl CanonicalWithVersion {
    pub fn parse(input: &str) -> Self {
        match input.split_once('|') {
            Some((url, version)) => Self {
                canonical: url.trim().to_string(),
                version: Some(version.trim().to_string()).filter(|v| !v.is_empty()),
            },
            None => Self {
                canonical: input.trim().to_string(),
                version: None,
            },
        }
    }
}
