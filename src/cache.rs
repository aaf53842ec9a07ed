//! Persistent cache snapshots keyed by a hash of the requested package set

use crate::config::PackageSpec;
use crate::content_hash::hash_directory;
use crate::domain::{IndexEntry, PackageInfo, ReferenceMetadata};
use crate::error::{Result, StorageError};
use crate::index::CanonicalIndex;
use crate::reference::ReferenceStore;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Cache key for a package spec list.
///
/// Blake3 hex digest of the JSON encoding of the sorted list, so the order in
/// which specs were configured does not matter.
///
/// # Example
///
/// ```rust
/// use octofhir_canonical_index::cache::cache_key_for_specs;
///
/// let a = cache_key_for_specs(&["pkg.a".to_string(), "pkg.b".to_string()]);
/// let b = cache_key_for_specs(&["pkg.b".to_string(), "pkg.a".to_string()]);
/// assert_eq!(a, b);
/// ```
pub fn cache_key_for_specs(specs: &[String]) -> String {
    key_hasher(specs).finalize().to_hex().to_string()
}

/// Cache key for a package spec list, folding in the content of local packages.
///
/// Registry specs contribute only their spec string. For each local spec the
/// recursive content hash of its source directory is mixed in as well, so
/// editing a local package invalidates the cache. A local directory that
/// cannot be read contributes a fixed marker instead.
#[tracing::instrument(name = "cache.compute_key", skip_all, fields(specs = specs.len()))]
pub async fn compute_cache_key(specs: &[String], working_dir: &Path) -> Result<String> {
    let mut sorted = specs.to_vec();
    sorted.sort();
    let mut hasher = key_hasher(&sorted);

    for spec in &sorted {
        let Ok(parsed) = PackageSpec::parse(spec) else {
            continue;
        };
        let Some(path) = parsed.local_path(working_dir) else {
            continue;
        };

        let digest = tokio::task::spawn_blocking(move || hash_directory(&path))
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        hasher.update(b"\n");
        hasher.update(spec.as_bytes());
        hasher.update(b"=");
        match digest {
            Ok(hash) => {
                hasher.update(hash.as_bytes());
            }
            Err(e) => {
                debug!(%spec, error = %e, "local package not readable for cache key");
                hasher.update(b"unreadable");
            }
        }
    }

    Ok(hasher.finalize().to_hex().to_string())
}

fn key_hasher(specs: &[String]) -> blake3::Hasher {
    let mut sorted = specs.to_vec();
    sorted.sort();
    // Infallible for Vec<String>.
    let json = serde_json::to_string(&sorted).unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(json.as_bytes());
    hasher
}

/// Serialised form of a whole [`CanonicalIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub entries: IndexMap<String, Vec<IndexEntry>>,
    pub packages: IndexMap<String, PackageInfo>,
    pub references: IndexMap<String, ReferenceMetadata>,
    pub cache_key: String,
}

/// Borrowed view used when writing, to avoid cloning the index.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRef<'a> {
    entries: &'a IndexMap<String, Vec<IndexEntry>>,
    packages: &'a IndexMap<String, PackageInfo>,
    references: IndexMap<&'a String, &'a ReferenceMetadata>,
    cache_key: &'a str,
}

impl CacheSnapshot {
    pub fn into_index(self) -> CanonicalIndex {
        CanonicalIndex {
            entries: self.entries,
            packages: self.packages,
            references: ReferenceStore::from_entries(self.references),
        }
    }
}

/// Directory of cache snapshots, one `<key>.json` file per cache key.
///
/// Validity is exact key equality: a snapshot is reused only when the key it
/// recorded matches the key being asked for.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Persist `index` under `key`, replacing any earlier snapshot for it.
    ///
    /// Each call writes its own uniquely named temporary file in the cache
    /// directory and renames it into place, so readers and concurrent writers
    /// never observe a partially written snapshot.
    #[tracing::instrument(name = "cache.save", skip_all, fields(key = %key))]
    pub async fn save(&self, index: &CanonicalIndex, key: &str) -> Result<()> {
        let path = self.snapshot_path(key);
        let write_failed = |message: String| StorageError::WriteFailed {
            path: path.clone(),
            message,
        };

        let snapshot = SnapshotRef {
            entries: &index.entries,
            packages: &index.packages,
            references: index.references.iter().collect(),
            cache_key: key,
        };
        let data = serde_json::to_vec(&snapshot)
            .map_err(|e| write_failed(format!("serialization failed: {e}")))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| write_failed(format!("cannot create cache directory: {e}")))?;

        let data_len = data.len();
        let dir = self.dir.clone();
        let prefix = format!("{key}.");
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> std::result::Result<(), String> {
            let mut temp = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(".json.tmp")
                .tempfile_in(&dir)
                .map_err(|e| format!("failed to create temporary file: {e}"))?;
            temp.write_all(&data)
                .and_then(|()| temp.as_file().sync_all())
                .map_err(|e| format!("failed to write temporary file: {e}"))?;
            temp.persist(&target)
                .map_err(|e| format!("failed to rename temporary file: {}", e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| write_failed(e.to_string()))?
        .map_err(write_failed)?;

        info!(
            urls = index.url_count(),
            references = index.references.size(),
            bytes = data_len,
            "saved cache snapshot"
        );
        Ok(())
    }

    /// Load the snapshot for `key`.
    ///
    /// Returns `None` when the file is missing, does not parse, or records a
    /// different key. Never fails.
    #[tracing::instrument(name = "cache.load", skip_all, fields(key = %key))]
    pub async fn load(&self, key: &str) -> Option<CanonicalIndex> {
        let path = self.snapshot_path(key);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(_) => {
                debug!(path = %path.display(), "no cache snapshot");
                return None;
            }
        };

        let snapshot: CacheSnapshot = match serde_json::from_slice(&data) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache snapshot");
                return None;
            }
        };

        if snapshot.cache_key != key {
            debug!(recorded = %snapshot.cache_key, "cache key mismatch");
            return None;
        }

        debug!("cache hit");
        Some(snapshot.into_index())
    }

    /// Remove every persisted snapshot.
    #[tracing::instrument(name = "cache.flush", skip_all, fields(dir = %self.dir.display()))]
    pub async fn flush(&self) -> Result<usize> {
        let flush_failed = |message: String| StorageError::FlushFailed {
            path: self.dir.clone(),
            message,
        };

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(flush_failed(e.to_string()).into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| flush_failed(e.to_string()))?
        {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".json") || name.ends_with(".json.tmp") {
                fs::remove_file(&path)
                    .await
                    .map_err(|e| flush_failed(format!("{}: {e}", path.display())))?;
                removed += 1;
            }
        }

        info!(removed, "flushed cache snapshots");
        Ok(removed)
    }
}
