//! Structured search, smart term search and SearchParameter aggregation

use crate::domain::{FhirResource, IndexEntry};
use crate::error::Result;
use crate::resolver::CanonicalResolver;
use dashmap::DashMap;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Short forms accepted by [`SearchEngine::smart_search`], mapped to the
/// lowercase tokens they stand for.
pub const ABBREVIATIONS: &[(&str, &[&str])] = &[
    ("sd", &["structuredefinition"]),
    ("obs", &["observation"]),
    ("pt", &["patient"]),
    ("vs", &["valueset"]),
    ("cs", &["codesystem", "capabilitystatement"]),
    ("cm", &["conceptmap"]),
    ("sp", &["searchparameter"]),
    ("od", &["operationdefinition"]),
    ("ig", &["implementationguide"]),
    ("ext", &["extension"]),
    ("enc", &["encounter"]),
    ("prac", &["practitioner", "practitionerrole"]),
    ("org", &["organization"]),
    ("med", &["medication", "medicationrequest", "medicationstatement"]),
    ("dx", &["diagnosticreport"]),
];

/// Structured AND-filter over index entries.
///
/// # Example
///
/// ```rust
/// use octofhir_canonical_index::search::SearchParams;
///
/// let params = SearchParams::default()
///     .with_kind("resource")
///     .with_package("hl7.fhir.r4.core");
/// assert!(params.url.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Restrict to one canonical URL bucket.
    pub url: Option<String>,
    pub kind: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub version: Option<String>,
    /// Package name.
    pub package: Option<String>,
}

impl SearchParams {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_type(mut self, type_: impl Into<String>) -> Self {
        self.type_ = Some(type_.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    fn matches(&self, entry: &IndexEntry) -> bool {
        field_matches(&self.kind, &entry.kind)
            && field_matches(&self.type_, &entry.type_)
            && field_matches(&self.version, &entry.version)
            && self.package.as_ref().is_none_or(|name| {
                entry
                    .package
                    .as_ref()
                    .is_some_and(|p| &p.name == name)
            })
    }
}

/// Narrowing filters for [`SearchEngine::smart_search`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartSearchFilters {
    pub resource_type: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub kind: Option<String>,
    pub package: Option<String>,
}

/// Typed view of a SearchParameter resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParameterInfo {
    pub name: String,
    pub code: String,
    pub base: Vec<String>,
    pub type_field: String,
    pub description: Option<String>,
    pub expression: Option<String>,
    pub url: Option<String>,
    pub status: Option<String>,
}

impl SearchParameterInfo {
    pub fn from_resource(resource: &FhirResource) -> Self {
        let content = &resource.content;
        let text = |field: &str| {
            content
                .get(field)
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        Self {
            name: text("name").unwrap_or_else(|| "unknown".to_string()),
            code: text("code").unwrap_or_default(),
            base: search_parameter_bases(resource),
            type_field: text("type").unwrap_or_else(|| "string".to_string()),
            description: text("description"),
            expression: text("expression"),
            url: text("url"),
            status: text("status"),
        }
    }
}

/// Query surface over one built index.
///
/// Owns the per-resource-type SearchParameter memo, so the memo lives exactly
/// as long as the index it was computed from.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    resolver: CanonicalResolver,
    search_parameters: Arc<DashMap<String, Vec<FhirResource>>>,
}

impl SearchEngine {
    pub fn new(resolver: CanonicalResolver) -> Self {
        Self {
            resolver,
            search_parameters: Arc::new(DashMap::new()),
        }
    }

    /// Entries matching every set field of `params`, in index order.
    pub fn search_entries(&self, params: &SearchParams) -> Vec<IndexEntry> {
        let index = self.resolver.index();
        match &params.url {
            Some(url) => index
                .entries_for(url)
                .unwrap_or_default()
                .iter()
                .filter(|entry| params.matches(entry))
                .cloned()
                .collect(),
            None => index
                .iter_entries()
                .filter(|entry| params.matches(entry))
                .cloned()
                .collect(),
        }
    }

    /// [`search_entries`](Self::search_entries) followed by a concurrent read
    /// of every match. Results keep the entry order.
    #[tracing::instrument(name = "search.search", skip_all)]
    pub async fn search(&self, params: &SearchParams) -> Result<Vec<FhirResource>> {
        let entries = self.search_entries(params);
        debug!(matches = entries.len(), "reading search matches");
        let references: Vec<_> = entries.iter().map(IndexEntry::reference).collect();
        try_join_all(
            references
                .iter()
                .map(|reference| self.resolver.read(reference)),
        )
        .await
    }

    /// Term search over url, type and resourceType.
    ///
    /// Every term must match a token prefix, an abbreviation expansion, or
    /// failing that a substring of the entry's text. No terms match everything.
    #[tracing::instrument(name = "search.smart_search", skip_all, fields(terms = terms.len()))]
    pub fn smart_search<S: AsRef<str>>(
        &self,
        terms: &[S],
        filters: &SmartSearchFilters,
    ) -> Vec<IndexEntry> {
        let params = SearchParams {
            kind: filters.kind.clone(),
            package: filters.package.clone(),
            ..SearchParams::default()
        };
        let terms: Vec<String> = terms
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        self.search_entries(&params)
            .into_iter()
            .filter(|entry| {
                filters
                    .resource_type
                    .as_ref()
                    .is_none_or(|wanted| wanted == &entry.resource_type)
                    && field_matches(&filters.type_, &entry.type_)
            })
            .filter(|entry| {
                let surface = search_surface(entry);
                let tokens = tokenize(&surface);
                terms
                    .iter()
                    .all(|term| term_matches(term, &tokens, &surface))
            })
            .collect()
    }

    /// SearchParameter resources whose `base` contains `resource_type`, sorted
    /// by `code`. Memoized per resource type.
    #[tracing::instrument(name = "search.search_parameters", skip(self))]
    pub async fn search_parameters_for_resource(
        &self,
        resource_type: &str,
    ) -> Result<Vec<FhirResource>> {
        if let Some(cached) = self.search_parameters.get(resource_type) {
            debug!(count = cached.len(), "search parameter memo hit");
            return Ok(cached.value().clone());
        }

        let references: Vec<_> = self
            .resolver
            .index()
            .iter_entries()
            .filter(|entry| entry.resource_type == "SearchParameter")
            .map(IndexEntry::reference)
            .collect();
        let resources = try_join_all(
            references
                .iter()
                .map(|reference| self.resolver.read(reference)),
        )
        .await?;

        let mut matching: Vec<FhirResource> = resources
            .into_iter()
            .filter(|resource| {
                search_parameter_bases(resource)
                    .iter()
                    .any(|base| base == resource_type)
            })
            .collect();
        matching.sort_by(|a, b| compare_codes(code_of(a), code_of(b)));

        debug!(
            scanned = references.len(),
            matched = matching.len(),
            "collected search parameters"
        );
        self.search_parameters
            .insert(resource_type.to_string(), matching.clone());
        Ok(matching)
    }

    /// Resource types with a memoized SearchParameter list.
    pub fn memoized_resource_types(&self) -> Vec<String> {
        self.search_parameters
            .iter()
            .map(|item| item.key().clone())
            .collect()
    }

    pub fn clear_memo(&self) {
        self.search_parameters.clear();
    }
}

fn field_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        Some(wanted) => actual.as_ref() == Some(wanted),
        None => true,
    }
}

fn search_surface(entry: &IndexEntry) -> String {
    format!(
        "{} {} {}",
        entry.url.as_deref().unwrap_or_default().to_lowercase(),
        entry.type_.as_deref().unwrap_or_default().to_lowercase(),
        entry.resource_type.to_lowercase()
    )
}

/// Split a lowercase surface on `/ - _ .` and whitespace.
fn tokenize(surface: &str) -> Vec<&str> {
    surface
        .split(|c: char| matches!(c, '/' | '-' | '_' | '.') || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .collect()
}

fn term_matches(term: &str, tokens: &[&str], surface: &str) -> bool {
    if tokens.iter().any(|token| token.starts_with(term)) {
        return true;
    }
    let expanded = ABBREVIATIONS
        .iter()
        .find(|(abbreviation, _)| *abbreviation == term)
        .is_some_and(|(_, expansions)| {
            expansions
                .iter()
                .any(|expansion| tokens.iter().any(|token| token.starts_with(expansion)))
        });
    expanded || surface.contains(term)
}

fn search_parameter_bases(resource: &FhirResource) -> Vec<String> {
    match resource.content.get("base") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Some(serde_json::Value::String(base)) => vec![base.clone()],
        _ => Vec::new(),
    }
}

fn code_of(resource: &FhirResource) -> &str {
    resource.str_field("code").unwrap_or_default()
}

/// Case-insensitive order; codes differing only in case put lowercase first.
fn compare_codes(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}
