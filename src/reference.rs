//! Reference store: content-addressed ids for resource files

use crate::content_hash::ContentHash;
use crate::domain::ReferenceMetadata;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::Path;

/// Deterministic reference id for a resource file.
///
/// Hash of `"{package_name}@{package_version}:{file_path}"`, encoded as a short
/// URL-safe token. The same triple always yields the same id, independent of
/// scan order or process.
///
/// # Example
///
/// ```rust
/// use octofhir_canonical_index::reference::generate_id;
/// use std::path::Path;
///
/// let a = generate_id("pkg.a", "1.0.0", Path::new("/pkgs/pkg.a/Patient.json"));
/// let b = generate_id("pkg.a", "1.0.0", Path::new("/pkgs/pkg.a/Patient.json"));
/// assert_eq!(a, b);
/// ```
pub fn generate_id(package_name: &str, package_version: &str, file_path: &Path) -> String {
    let key = format!(
        "{package_name}@{package_version}:{}",
        file_path.to_string_lossy()
    );
    ContentHash::from_bytes(key.as_bytes()).to_token()
}

/// Registry of reference id -> location metadata, with a url -> ids reverse index.
///
/// Ids iterate in insertion order, so a store rebuilt from its own
/// [`iter`](Self::iter) output has identical per-url id ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceStore {
    by_id: IndexMap<String, ReferenceMetadata>,
    by_url: HashMap<String, Vec<String>>,
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert metadata for `id`.
    ///
    /// When the metadata carries a url, the id is added to that url's id set
    /// once; repeating the call does not duplicate it.
    pub fn set(&mut self, id: impl Into<String>, metadata: ReferenceMetadata) {
        let id = id.into();
        if let Some(url) = &metadata.url {
            let ids = self.by_url.entry(url.clone()).or_default();
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }
        self.by_id.insert(id, metadata);
    }

    pub fn get(&self, id: &str) -> Option<&ReferenceMetadata> {
        self.by_id.get(id)
    }

    pub fn has(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn size(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_url.clear();
    }

    /// Ids registered under `url`, in insertion order. Empty when unknown.
    pub fn ids_by_url(&self, url: &str) -> &[String] {
        self.by_url.get(url).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ReferenceMetadata)> {
        self.by_id.iter()
    }

    /// Rebuild a store from persisted `(id, metadata)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ReferenceMetadata)>) -> Self {
        let mut store = Self::new();
        for (id, metadata) in entries {
            store.set(id, metadata);
        }
        store
    }
}
