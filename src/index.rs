//! In-memory canonical index

use crate::domain::{IndexEntry, PackageInfo};
use crate::reference::ReferenceStore;
use indexmap::IndexMap;

/// Everything one scan pass produces.
///
/// `entries` is an insertion-ordered multimap: several packages (or several
/// versions of one package) may publish the same canonical URL, and the
/// resolver relies on the insertion order to break ties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalIndex {
    pub entries: IndexMap<String, Vec<IndexEntry>>,
    pub packages: IndexMap<String, PackageInfo>,
    pub references: ReferenceStore,
}

impl CanonicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the bucket for `url`.
    pub fn add_entry(&mut self, url: impl Into<String>, entry: IndexEntry) {
        self.entries.entry(url.into()).or_default().push(entry);
    }

    /// Register a package. A later registration under the same name replaces
    /// the earlier one but keeps its position.
    pub fn add_package(&mut self, info: PackageInfo) {
        self.packages.insert(info.id.name.clone(), info);
    }

    pub fn entries_for(&self, url: &str) -> Option<&[IndexEntry]> {
        self.entries.get(url).map(Vec::as_slice)
    }

    /// Every entry, bucket by bucket, in insertion order.
    pub fn iter_entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values().flatten()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn url_count(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.packages.clear();
        self.references.clear();
    }
}
