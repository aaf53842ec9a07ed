//! Package acquisition boundary
//!
//! The index never fetches packages itself. Before scanning, the manager asks a
//! [`PackageAcquisition`] implementation to make sure every requested package
//! is present under the package root. Failures are propagated unchanged; the
//! manager does not retry.

use crate::config::{PackageSpec, expand_path};
use crate::content_hash::TRANSIENT_DIRS;
use crate::error::{AcquisitionError, Result};
use crate::package::{package_content_dir, package_dirs, parse_manifest};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Installs packages onto local disk.
///
/// On success `destination` must contain one directory per package, following
/// the FHIR NPM layout: a `package.json` manifest, optionally an `.index.json`
/// and an `examples/` sub-directory. Scoped names may add one level of nesting.
#[async_trait::async_trait]
pub trait PackageAcquisition: Send + Sync {
    async fn ensure_installed(
        &self,
        specs: &[String],
        destination: &Path,
        registry: Option<&str>,
    ) -> Result<()>;
}

/// Acquisition backed by the local filesystem.
///
/// Local specs (`file:<path>`, or paths starting with `.`, `/` or `~`) are
/// copied into the destination under their manifest name. Registry specs are
/// expected to be installed already; a spec with no matching package fails
/// with [`AcquisitionError::MissingPackage`].
#[derive(Debug, Clone)]
pub struct DirectoryAcquisition {
    working_dir: PathBuf,
}

impl DirectoryAcquisition {
    /// `working_dir` anchors relative local spec paths.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    async fn install_local(&self, source: &Path, destination: &Path) -> Result<()> {
        let content_dir =
            package_content_dir(source)
                .await
                .ok_or_else(|| AcquisitionError::CopyFailed {
                    path: source.to_path_buf(),
                    message: "no package.json found".to_string(),
                })?;
        let manifest =
            parse_manifest(&content_dir)
                .await
                .map_err(|e| AcquisitionError::CopyFailed {
                    path: source.to_path_buf(),
                    message: e.to_string(),
                })?;

        let target = install_dir(destination, &manifest.name).ok_or_else(|| {
            AcquisitionError::InvalidPackageName {
                name: manifest.name.clone(),
                path: content_dir.clone(),
            }
        })?;
        debug!(
            package = %manifest.name,
            from = %content_dir.display(),
            to = %target.display(),
            "copying local package"
        );

        let from = content_dir.clone();
        let to = target.clone();
        tokio::task::spawn_blocking(move || copy_tree(&from, &to))
            .await
            .map_err(|e| AcquisitionError::Failed {
                message: e.to_string(),
            })?
            .map_err(|e| AcquisitionError::CopyFailed {
                path: content_dir,
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn find_installed(
        &self,
        destination: &Path,
        name: &str,
        version: Option<&str>,
    ) -> Option<PathBuf> {
        for dir in package_dirs(destination).await {
            let Some(content_dir) = package_content_dir(&dir).await else {
                continue;
            };
            let Ok(manifest) = parse_manifest(&content_dir).await else {
                continue;
            };
            if manifest.name == name && version.is_none_or(|v| v == manifest.version) {
                return Some(content_dir);
            }
        }
        None
    }
}

#[async_trait::async_trait]
impl PackageAcquisition for DirectoryAcquisition {
    #[tracing::instrument(name = "acquisition.ensure_installed", skip_all, fields(specs = specs.len()))]
    async fn ensure_installed(
        &self,
        specs: &[String],
        destination: &Path,
        registry: Option<&str>,
    ) -> Result<()> {
        if let Some(registry) = registry {
            debug!(%registry, "registry url ignored by directory acquisition");
        }
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| AcquisitionError::Failed {
                message: format!("cannot create {}: {e}", destination.display()),
            })?;

        for spec in specs {
            let parsed =
                PackageSpec::parse(spec).map_err(|_| AcquisitionError::UnsupportedSpec {
                    spec: spec.clone(),
                })?;
            match parsed {
                PackageSpec::Local { path } => {
                    let source = expand_path(&path);
                    let source = if source.is_absolute() {
                        source
                    } else {
                        self.working_dir.join(source)
                    };
                    self.install_local(&source, destination).await?;
                }
                PackageSpec::Registry { name, version } => {
                    let found = self
                        .find_installed(destination, &name, version.as_deref())
                        .await;
                    if found.is_none() {
                        return Err(AcquisitionError::MissingPackage { spec: spec.clone() }.into());
                    }
                }
            }
        }

        info!(count = specs.len(), "packages present");
        Ok(())
    }
}

/// Install location for a manifest name: `<destination>/<name>` or
/// `<destination>/@scope/<name>`. Any other shape (absolute, `.`/`..`
/// segments, deeper nesting) yields `None`.
fn install_dir(destination: &Path, name: &str) -> Option<PathBuf> {
    let segments: Vec<&str> = name.split('/').collect();
    let valid_segment = |s: &str| {
        !s.is_empty()
            && s != "."
            && s != ".."
            && !s.contains('\\')
            && Path::new(s)
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
    };
    let shape_ok = match segments.as_slice() {
        [name] => !name.starts_with('@') && valid_segment(name),
        [scope, name] => scope.starts_with('@') && valid_segment(scope) && valid_segment(name),
        _ => false,
    };
    if !shape_ok {
        return None;
    }
    let target = destination.join(name);
    target.starts_with(destination).then_some(target)
}

/// Replace `to` with a copy of `from`, skipping transient build directories.
fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    if to.exists() {
        std::fs::remove_dir_all(to)?;
    }
    std::fs::create_dir_all(to)?;

    let walker = WalkDir::new(from).into_iter().filter_entry(|e| {
        !(e.depth() > 0
            && e.file_type().is_dir()
            && e.file_name()
                .to_str()
                .is_some_and(|name| TRANSIENT_DIRS.contains(&name)))
    });
    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(std::io::Error::other)?;
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
