//! Canonical URL resolution

use crate::domain::{CanonicalWithVersion, FhirResource, IndexEntry, PackageId, Reference};
use crate::error::{ResolutionError, Result};
use crate::index::CanonicalIndex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Hints used to disambiguate a canonical URL published by several packages.
///
/// # Example
///
/// ```rust
/// use octofhir_canonical_index::resolver::ResolveOptions;
///
/// let options = ResolveOptions::default().with_package("hl7.fhir.us.core");
/// assert_eq!(options.package.as_deref(), Some("hl7.fhir.us.core"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Keep only candidates from the package with this name.
    pub package: Option<String>,
    /// Keep only candidates whose resource version equals this.
    pub version: Option<String>,
    /// Where the reference being resolved was found.
    pub source_context: Option<SourceContext>,
}

/// Origin of a reference being resolved.
///
/// When `package` is set, resolution is first attempted inside that exact
/// package; a hit there wins over the global lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    pub package: Option<PackageId>,
    pub url: Option<String>,
}

impl ResolveOptions {
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_source_package(mut self, package: PackageId) -> Self {
        self.source_context
            .get_or_insert_with(SourceContext::default)
            .package = Some(package);
        self
    }
}

/// Resolves canonical URLs against a built index and reads resource files.
#[derive(Debug, Clone)]
pub struct CanonicalResolver {
    index: Arc<CanonicalIndex>,
}

impl CanonicalResolver {
    pub fn new(index: Arc<CanonicalIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &CanonicalIndex {
        &self.index
    }

    /// Resolve `url` to exactly one index entry.
    ///
    /// Candidates keep scan-insertion order; after the package and version
    /// filters the first remaining candidate is returned. `url|version` is
    /// accepted when the literal string is not itself indexed.
    #[tracing::instrument(name = "resolver.resolve_entry", skip(self, options), fields(canonical = %url))]
    pub fn resolve_entry(&self, url: &str, options: &ResolveOptions) -> Result<IndexEntry> {
        let (candidates, version) = self.candidates(url, options)?;

        if let Some(source) = options
            .source_context
            .as_ref()
            .and_then(|ctx| ctx.package.as_ref())
            && let Some(entry) = candidates.iter().find(|entry| {
                entry.package.as_ref() == Some(source) && version_matches(entry, version.as_deref())
            })
        {
            debug!(package = %source, "resolved within source package");
            return Ok(entry.clone());
        }

        let mut remaining: Vec<&IndexEntry> = candidates.iter().collect();
        if let Some(package) = &options.package {
            remaining.retain(|entry| {
                entry
                    .package
                    .as_ref()
                    .is_some_and(|p| &p.name == package)
            });
        }
        if version.is_some() {
            remaining.retain(|entry| version_matches(entry, version.as_deref()));
        }

        match remaining.first() {
            Some(entry) => {
                debug!(
                    candidates = candidates.len(),
                    id = %entry.id,
                    "resolved canonical"
                );
                Ok((*entry).clone())
            }
            None => Err(ResolutionError::NoMatchForOptions {
                url: url.to_string(),
                package: options.package.clone(),
                version,
            }
            .into()),
        }
    }

    /// Resolve `url` and read the winning resource.
    pub async fn resolve(&self, url: &str, options: &ResolveOptions) -> Result<FhirResource> {
        let entry = self.resolve_entry(url, options)?;
        self.read(&entry.reference()).await
    }

    /// Read the file behind `reference`.
    #[tracing::instrument(name = "resolver.read", skip(self), fields(id = %reference.id))]
    pub async fn read(&self, reference: &Reference) -> Result<FhirResource> {
        let metadata = self.index.references.get(&reference.id).ok_or_else(|| {
            ResolutionError::InvalidReference {
                id: reference.id.clone(),
            }
        })?;

        let read_failure = |source: Box<dyn std::error::Error + Send + Sync>| {
            ResolutionError::ReadFailure {
                id: reference.id.clone(),
                path: metadata.file_path.clone(),
                source,
            }
        };

        let bytes = tokio::fs::read(&metadata.file_path)
            .await
            .map_err(|e| read_failure(Box::new(e)))?;
        let content: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| read_failure(Box::new(e)))?;

        Ok(FhirResource::new(reference, content))
    }

    /// Bucket for `url` plus the effective version filter.
    fn candidates<'a>(
        &'a self,
        url: &str,
        options: &ResolveOptions,
    ) -> Result<(&'a [IndexEntry], Option<String>)> {
        if let Some(bucket) = self.index.entries_for(url) {
            return Ok((bucket, options.version.clone()));
        }

        if url.contains('|') {
            let parsed = CanonicalWithVersion::parse(url);
            if let Some(bucket) = self.index.entries_for(&parsed.canonical) {
                return Ok((bucket, options.version.clone().or(parsed.version)));
            }
        }

        Err(ResolutionError::CanonicalUrlNotFound {
            url: url.to_string(),
        }
        .into())
    }
}

fn version_matches(entry: &IndexEntry, version: Option<&str>) -> bool {
    match version {
        Some(version) => entry.version.as_deref() == Some(version),
        None => true,
    }
}
