//! Error types for the canonical index

use std::path::PathBuf;
use thiserror::Error;

/// Main result type used throughout the canonical index.
///
/// # Example
///
/// ```rust,no_run
/// use octofhir_canonical_index::error::Result;
///
/// fn example_operation() -> Result<String> {
///     Ok("Success".to_string())
/// }
/// ```
pub type Result<T> = std::result::Result<T, FcmError>;

/// Main error type for the canonical index.
///
/// Scan-time problems never reach this type: the scanner swallows them (or
/// records them as advisory warnings). Everything that is returned to a caller
/// goes through one of these variants so each failure stays identifiable.
///
/// # Example
///
/// ```rust
/// use octofhir_canonical_index::error::{FcmError, ResolutionError};
///
/// let err: FcmError = ResolutionError::CanonicalUrlNotFound {
///     url: "http://example.org/missing".to_string(),
/// }
/// .into();
/// assert!(err.is_not_found());
/// ```
#[derive(Error, Debug)]
pub enum FcmError {
    #[error("Canonical manager is not initialized; call init() first")]
    NotInitialized,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl FcmError {
    /// True for [`ResolutionError::CanonicalUrlNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FcmError::Resolution(ResolutionError::CanonicalUrlNotFound { .. })
        )
    }
}

/// Errors related to configuration loading, parsing, and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {path}")]
    InvalidFile { path: PathBuf },

    #[error("Invalid registry URL: {url}")]
    InvalidRegistryUrl { url: String },

    #[error("Invalid package specification: {spec}")]
    InvalidPackageSpec { spec: String },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Problems found while reading a single package directory.
///
/// The scanner never propagates these; they are rendered into advisory
/// warning strings when warning collection is enabled.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Missing package manifest in {path}")]
    MissingManifest { path: PathBuf },

    #[error("Invalid package manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("Missing resource index {path}, resources indexed by fallback scan")]
    MissingIndex { path: PathBuf },

    #[error("Invalid resource index {path}: {message}")]
    InvalidIndex { path: PathBuf, message: String },
}

/// Errors from the on-disk cache snapshot store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write cache snapshot {path}: {message}")]
    WriteFailed { path: PathBuf, message: String },

    #[error("Failed to flush cache directory {path}: {message}")]
    FlushFailed { path: PathBuf, message: String },
}

/// Errors related to canonical URL resolution and resource reads.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Canonical URL not found: {url}")]
    CanonicalUrlNotFound { url: String },

    #[error("No match for given options: {url} (package: {package:?}, version: {version:?})")]
    NoMatchForOptions {
        url: String,
        package: Option<String>,
        version: Option<String>,
    },

    #[error("Invalid reference: {id}")]
    InvalidReference { id: String },

    #[error("Failed to read resource {id} from {path}: {source}")]
    ReadFailure {
        id: String,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Failures reported by a package acquisition service.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Unsupported package specification: {spec}")]
    UnsupportedSpec { spec: String },

    #[error("Package not installed: {spec}")]
    MissingPackage { spec: String },

    #[error("Failed to copy local package {path}: {message}")]
    CopyFailed { path: PathBuf, message: String },

    #[error("Package name {name:?} from {path} is not a valid install directory")]
    InvalidPackageName { name: String, path: PathBuf },

    #[error("Package acquisition failed: {message}")]
    Failed { message: String },
}

/// Trait for validating configuration and data structures.
///
/// # Example
///
/// ```rust
/// use octofhir_canonical_index::error::{ConfigError, Validate};
///
/// struct MyConfig {
///     url: String,
/// }
///
/// impl Validate for MyConfig {
///     type Error = ConfigError;
///
///     fn validate(&self) -> Result<(), Self::Error> {
///         if self.url.is_empty() {
///             Err(ConfigError::ValidationFailed {
///                 message: "URL cannot be empty".to_string(),
///             })
///         } else {
///             Ok(())
///         }
///     }
/// }
/// ```
pub trait Validate {
    type Error;
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}
