//! # FHIR Canonical Index
//!
//! Indexing, caching and canonical URL resolution for installed FHIR packages.
//!
//! The [`CanonicalManager`] walks a package tree once, persists the resulting
//! index under a key derived from the requested package set, and reloads it on
//! later runs instead of rescanning.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use octofhir_canonical_index::{CanonicalManager, FcmConfig, ResolveOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FcmConfig::load().await?;
//!     let manager = CanonicalManager::new(config)?;
//!     manager.init().await?;
//!
//!     let resource = manager
//!         .resolve(
//!             "http://hl7.org/fhir/StructureDefinition/Patient",
//!             &ResolveOptions::default(),
//!         )
//!         .await?;
//!     println!("{}", resource.resource_type);
//!     Ok(())
//! }
//! ```

pub mod acquisition;
pub mod cache;
pub mod config;
pub mod content_hash;
pub mod domain;
pub mod error;
pub mod index;
pub mod package;
pub mod reference;
pub mod resolver;
pub mod search;

pub use acquisition::{DirectoryAcquisition, PackageAcquisition};
pub use cache::{CacheStore, cache_key_for_specs, compute_cache_key};
pub use config::{FcmConfig, PackageSpec, RegistryConfig, ScanConfig, StorageConfig};
pub use domain::{FhirResource, IndexEntry, PackageId, PackageInfo, Reference, ReferenceMetadata};
pub use error::{FcmError, Result};
pub use index::CanonicalIndex;
pub use package::PackageScanner;
pub use reference::{ReferenceStore, generate_id};
pub use resolver::{CanonicalResolver, ResolveOptions, SourceContext};
pub use search::{SearchEngine, SearchParameterInfo, SearchParams, SmartSearchFilters};

use indexmap::IndexMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Lifecycle state of a [`CanonicalManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
}

/// A built index plus everything derived from it.
struct Loaded {
    search: SearchEngine,
    resolver: CanonicalResolver,
    cache_key: String,
    warnings: Vec<String>,
}

enum State {
    Uninitialized,
    Initializing,
    Ready(Arc<Loaded>),
}

/// Main entry point: owns the package spec list and the index lifecycle.
///
/// Queries fail with [`FcmError::NotInitialized`] until [`init`](Self::init)
/// has completed. Lifecycle operations are serialized; queries only take a
/// snapshot of the current index and may run concurrently with each other.
pub struct CanonicalManager {
    config: FcmConfig,
    specs: RwLock<Vec<String>>,
    state: RwLock<State>,
    lifecycle: tokio::sync::Mutex<()>,
    cache: CacheStore,
    acquisition: Arc<dyn PackageAcquisition>,
}

impl CanonicalManager {
    /// Manager using [`DirectoryAcquisition`] rooted at the configured working
    /// directory.
    pub fn new(config: FcmConfig) -> Result<Self> {
        let acquisition = Arc::new(DirectoryAcquisition::new(config.storage.working_dir()));
        Self::with_acquisition(config, acquisition)
    }

    /// Manager delegating package installation to `acquisition`.
    pub fn with_acquisition(
        config: FcmConfig,
        acquisition: Arc<dyn PackageAcquisition>,
    ) -> Result<Self> {
        config.validate()?;
        let cache = CacheStore::new(config.storage.cache_dir());
        Ok(Self {
            specs: RwLock::new(dedup(config.packages.iter().cloned())),
            config,
            state: RwLock::new(State::Uninitialized),
            lifecycle: tokio::sync::Mutex::new(()),
            cache,
            acquisition,
        })
    }

    pub fn config(&self) -> &FcmConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        match &*self.read_state() {
            State::Uninitialized => ManagerState::Uninitialized,
            State::Initializing => ManagerState::Initializing,
            State::Ready(_) => ManagerState::Ready,
        }
    }

    /// Package specs currently requested.
    pub fn package_specs(&self) -> Vec<String> {
        self.specs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Cache key of the loaded index, if ready.
    pub fn cache_key(&self) -> Option<String> {
        self.loaded().ok().map(|loaded| loaded.cache_key.clone())
    }

    /// Advisory scan warnings from the last scan (empty on a cache hit or when
    /// warning collection is off).
    pub fn warnings(&self) -> Result<Vec<String>> {
        Ok(self.loaded()?.warnings.clone())
    }

    /// Load the index from cache or build it.
    ///
    /// Idempotent: when already ready, returns the current package mapping
    /// without doing any work.
    #[tracing::instrument(name = "manager.init", skip_all)]
    pub async fn init(&self) -> Result<IndexMap<String, PackageId>> {
        let _guard = self.lifecycle.lock().await;
        self.init_locked().await
    }

    /// Drop the in-memory index and every memo derived from it. The on-disk
    /// snapshot is kept.
    pub async fn destroy(&self) {
        let _guard = self.lifecycle.lock().await;
        *self.write_state() = State::Uninitialized;
        info!("canonical manager destroyed");
    }

    /// Installed packages in the loaded index.
    pub fn packages(&self) -> Result<Vec<PackageInfo>> {
        let loaded = self.loaded()?;
        Ok(loaded.resolver.index().packages.values().cloned().collect())
    }

    /// Add package specs.
    ///
    /// Before initialization this initializes. Afterwards, any genuinely new
    /// spec triggers a full rebuild (acquisition and rescan) under the new
    /// cache key; the previous index keeps serving queries until the rebuilt
    /// one replaces it. On any error the spec list is left unchanged.
    #[tracing::instrument(name = "manager.add_packages", skip_all, fields(count = names.len()))]
    pub async fn add_packages<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        let previous = self.package_specs();
        let mut specs = previous.clone();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || specs.iter().any(|s| s == name) {
                continue;
            }
            PackageSpec::parse(name)?;
            specs.push(name.to_string());
        }

        if !matches!(&*self.read_state(), State::Ready(_)) {
            self.set_specs(specs);
            if let Err(e) = self.init_locked().await {
                self.set_specs(previous);
                return Err(e);
            }
            return Ok(());
        }
        if specs.len() == previous.len() {
            return Ok(());
        }

        info!(
            added = specs.len() - previous.len(),
            "package set changed, rebuilding index"
        );
        let key = compute_cache_key(&specs, &self.config.storage.working_dir()).await?;
        let loaded = self.build(&specs, key).await?;
        self.set_specs(specs);
        *self.write_state() = State::Ready(Arc::new(loaded));
        Ok(())
    }

    /// Remove every persisted cache snapshot.
    pub async fn flush_cache(&self) -> Result<usize> {
        self.cache.flush().await
    }

    pub fn resolve_entry(&self, url: &str, options: &ResolveOptions) -> Result<IndexEntry> {
        self.loaded()?.resolver.resolve_entry(url, options)
    }

    pub async fn resolve(&self, url: &str, options: &ResolveOptions) -> Result<FhirResource> {
        let loaded = self.loaded()?;
        loaded.resolver.resolve(url, options).await
    }

    pub async fn read(&self, reference: &Reference) -> Result<FhirResource> {
        let loaded = self.loaded()?;
        loaded.resolver.read(reference).await
    }

    pub fn search_entries(&self, params: &SearchParams) -> Result<Vec<IndexEntry>> {
        Ok(self.loaded()?.search.search_entries(params))
    }

    pub async fn search(&self, params: &SearchParams) -> Result<Vec<FhirResource>> {
        let loaded = self.loaded()?;
        loaded.search.search(params).await
    }

    pub fn smart_search<S: AsRef<str>>(
        &self,
        terms: &[S],
        filters: &SmartSearchFilters,
    ) -> Result<Vec<IndexEntry>> {
        Ok(self.loaded()?.search.smart_search(terms, filters))
    }

    /// SearchParameter resources applicable to `resource_type`, sorted by code.
    /// Memoized until the index is destroyed or rebuilt.
    pub async fn search_parameters_for_resource(
        &self,
        resource_type: &str,
    ) -> Result<Vec<FhirResource>> {
        let loaded = self.loaded()?;
        loaded
            .search
            .search_parameters_for_resource(resource_type)
            .await
    }

    /// Typed form of [`search_parameters_for_resource`](Self::search_parameters_for_resource).
    pub async fn search_parameter_infos(
        &self,
        resource_type: &str,
    ) -> Result<Vec<SearchParameterInfo>> {
        let resources = self.search_parameters_for_resource(resource_type).await?;
        Ok(resources
            .iter()
            .map(SearchParameterInfo::from_resource)
            .collect())
    }

    async fn init_locked(&self) -> Result<IndexMap<String, PackageId>> {
        if let State::Ready(loaded) = &*self.read_state() {
            return Ok(package_ids(loaded));
        }

        *self.write_state() = State::Initializing;
        match self.load_or_build().await {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                let ids = package_ids(&loaded);
                *self.write_state() = State::Ready(loaded);
                Ok(ids)
            }
            Err(e) => {
                *self.write_state() = State::Uninitialized;
                Err(e)
            }
        }
    }

    async fn load_or_build(&self) -> Result<Loaded> {
        let specs = self.package_specs();
        let key = compute_cache_key(&specs, &self.config.storage.working_dir()).await?;

        if let Some(index) = self.cache.load(&key).await {
            info!(
                packages = index.packages.len(),
                urls = index.url_count(),
                "index loaded from cache"
            );
            return Ok(Loaded::new(index, key, Vec::new()));
        }

        self.build(&specs, key).await
    }

    async fn build(&self, specs: &[String], key: String) -> Result<Loaded> {
        let packages_dir = self.config.storage.packages_dir();
        self.acquisition
            .ensure_installed(specs, &packages_dir, self.config.registry.url.as_deref())
            .await?;

        let outcome = PackageScanner::new(self.config.scan.collect_warnings)
            .scan(&packages_dir)
            .await;
        for warning in &outcome.warnings {
            warn!(%warning, "package scan");
        }

        if let Err(e) = self.cache.save(&outcome.index, &key).await {
            warn!(error = %e, "could not persist index snapshot");
        }
        Ok(Loaded::new(outcome.index, key, outcome.warnings))
    }

    fn loaded(&self) -> Result<Arc<Loaded>> {
        match &*self.read_state() {
            State::Ready(loaded) => Ok(Arc::clone(loaded)),
            _ => Err(FcmError::NotInitialized),
        }
    }

    fn set_specs(&self, specs: Vec<String>) {
        *self.specs.write().unwrap_or_else(|e| e.into_inner()) = specs;
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Loaded {
    fn new(index: CanonicalIndex, cache_key: String, warnings: Vec<String>) -> Self {
        let resolver = CanonicalResolver::new(Arc::new(index));
        Self {
            search: SearchEngine::new(resolver.clone()),
            resolver,
            cache_key,
            warnings,
        }
    }
}

fn package_ids(loaded: &Loaded) -> IndexMap<String, PackageId> {
    loaded
        .resolver
        .index()
        .packages
        .iter()
        .map(|(name, info)| (name.clone(), info.id.clone()))
        .collect()
}

fn dedup(specs: impl Iterator<Item = String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for spec in specs {
        if !unique.contains(&spec) {
            unique.push(spec);
        }
    }
    unique
}
