//! Configuration management for the canonical index

use crate::error::{ConfigError, Result, Validate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the directory (under the working directory) holding default storage.
pub const FCM_DIR: &str = ".fcm";

/// Main configuration structure.
///
/// Holds the package specification list, the optional registry URL handed to
/// the acquisition service, storage locations and scanner options.
///
/// # Example
///
/// ```rust,no_run
/// use octofhir_canonical_index::config::FcmConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = FcmConfig::load().await?;
/// println!("Cache dir: {}", config.storage.cache_dir().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FcmConfig {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Registry location passed through to the acquisition service.
///
/// The index itself never talks to a registry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub url: Option<String>,
}

/// Storage locations.
///
/// `cache_dir` and `packages_dir` default to `<working_dir>/.fcm/cache` and
/// `<working_dir>/.fcm/packages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub packages_dir: Option<PathBuf>,
}

/// Scanner options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScanConfig {
    /// Record advisory per-package warnings while scanning.
    #[serde(default)]
    pub collect_warnings: bool,
}

/// A parsed package specification string.
///
/// # Example
///
/// ```rust
/// use octofhir_canonical_index::config::PackageSpec;
///
/// let spec = PackageSpec::parse("hl7.fhir.r4.core@4.0.1").unwrap();
/// assert_eq!(
///     spec,
///     PackageSpec::Registry {
///         name: "hl7.fhir.r4.core".to_string(),
///         version: Some("4.0.1".to_string()),
///     }
/// );
/// assert!(PackageSpec::parse("file:./my-ig").unwrap().is_local());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSpec {
    Registry {
        name: String,
        version: Option<String>,
    },
    Local {
        path: PathBuf,
    },
}

impl PackageSpec {
    pub fn parse(spec: &str) -> std::result::Result<Self, ConfigError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidPackageSpec {
                spec: spec.to_string(),
            });
        }

        if let Some(path) = trimmed.strip_prefix("file:") {
            if path.is_empty() {
                return Err(ConfigError::InvalidPackageSpec {
                    spec: spec.to_string(),
                });
            }
            return Ok(Self::Local {
                path: PathBuf::from(path),
            });
        }

        if trimmed.starts_with('.') || trimmed.starts_with('/') || trimmed.starts_with('~') {
            return Ok(Self::Local {
                path: PathBuf::from(trimmed),
            });
        }

        // A leading '@' belongs to a scoped name, not to the version separator.
        match trimmed.rsplit_once('@') {
            Some((name, version)) if !name.is_empty() => {
                if version.is_empty() {
                    return Err(ConfigError::InvalidPackageSpec {
                        spec: spec.to_string(),
                    });
                }
                Ok(Self::Registry {
                    name: name.to_string(),
                    version: Some(version.to_string()),
                })
            }
            _ => Ok(Self::Registry {
                name: trimmed.to_string(),
                version: None,
            }),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    /// Absolute location of a local spec, relative paths resolved against
    /// `working_dir`. `None` for registry specs.
    pub fn local_path(&self, working_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::Local { path } => {
                let expanded = expand_path(path);
                Some(if expanded.is_absolute() {
                    expanded
                } else {
                    working_dir.join(expanded)
                })
            }
            Self::Registry { .. } => None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            cache_dir: None,
            packages_dir: None,
        }
    }
}

impl StorageConfig {
    /// Storage rooted at `working_dir` with default sub-directories.
    pub fn in_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            cache_dir: None,
            packages_dir: None,
        }
    }

    pub fn working_dir(&self) -> PathBuf {
        expand_path(&self.working_dir)
    }

    /// Directory holding cache snapshots.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => expand_path(dir),
            None => self.working_dir().join(FCM_DIR).join("cache"),
        }
    }

    /// Package root the acquisition service installs into and the scanner walks.
    pub fn packages_dir(&self) -> PathBuf {
        match &self.packages_dir {
            Some(dir) => expand_path(dir),
            None => self.working_dir().join(FCM_DIR).join("packages"),
        }
    }
}

impl FcmConfig {
    /// Loads configuration from the default location (fcm.toml in current directory).
    ///
    /// If no configuration file exists, returns a default configuration.
    /// Environment variable overrides are applied in both cases.
    pub async fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        let mut config = if tokio::fs::try_exists(&config_path).await.unwrap_or(false) {
            Self::from_file(&config_path).await?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates configuration from a TOML file.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::InvalidFile {
                path: path.to_path_buf(),
            })?;

        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default configuration file path (fcm.toml in current directory).
    pub fn default_config_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("fcm.toml")
    }

    /// Configuration for the given package specs, stored under `working_dir`.
    pub fn with_packages<I, S>(working_dir: impl Into<PathBuf>, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
            storage: StorageConfig::in_dir(working_dir),
            ..Self::default()
        }
    }

    /// Validates the current configuration for correctness.
    pub fn validate(&self) -> Result<()> {
        <Self as Validate>::validate(self)?;
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FCM_REGISTRY_URL") {
            self.registry.url = Some(url);
        }

        if let Ok(working_dir) = std::env::var("FCM_WORKING_DIR") {
            self.storage.working_dir = PathBuf::from(working_dir);
        }

        if let Ok(cache_dir) = std::env::var("FCM_CACHE_DIR") {
            self.storage.cache_dir = Some(PathBuf::from(cache_dir));
        }

        if let Ok(packages_dir) = std::env::var("FCM_PACKAGES_DIR") {
            self.storage.packages_dir = Some(PathBuf::from(packages_dir));
        }
    }

    /// Parsed form of every configured package spec.
    pub fn package_specs(&self) -> std::result::Result<Vec<PackageSpec>, ConfigError> {
        self.packages.iter().map(|s| PackageSpec::parse(s)).collect()
    }

    /// Create test configuration
    #[cfg(test)]
    pub fn test_config(temp_dir: &Path) -> Self {
        Self {
            packages: vec![],
            registry: RegistryConfig::default(),
            storage: StorageConfig {
                working_dir: temp_dir.to_path_buf(),
                cache_dir: Some(temp_dir.join("cache")),
                packages_dir: Some(temp_dir.join("packages")),
            },
            scan: ScanConfig::default(),
        }
    }
}

/// Expand tilde paths to full paths
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home_dir) = dirs::home_dir()
    {
        return home_dir.join(rest);
    }
    path.to_path_buf()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Validate for FcmConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        self.registry.validate()?;
        self.storage.validate()?;
        for spec in &self.packages {
            PackageSpec::parse(spec)?;
        }
        Ok(())
    }
}

impl Validate for RegistryConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        let Some(raw) = &self.url else {
            return Ok(());
        };

        let parsed_url = url::Url::parse(raw)
            .map_err(|_| ConfigError::InvalidRegistryUrl { url: raw.clone() })?;

        if parsed_url.scheme() != "http" && parsed_url.scheme() != "https" {
            return Err(ConfigError::InvalidRegistryUrl { url: raw.clone() });
        }

        Ok(())
    }
}

impl Validate for StorageConfig {
    type Error = ConfigError;

    fn validate(&self) -> std::result::Result<(), Self::Error> {
        if self.working_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed {
                message: "Working directory cannot be empty".to_string(),
            });
        }

        if self
            .cache_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            return Err(ConfigError::ValidationFailed {
                message: "Cache directory cannot be empty".to_string(),
            });
        }

        if self
            .packages_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            return Err(ConfigError::ValidationFailed {
                message: "Packages directory cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}
