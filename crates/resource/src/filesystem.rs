//! Filesystem-based template resolver for native platforms.
//!
//! Logical names are mapped to files below a template directory using the
//! dialect's extension (`mail.welcome` in markup becomes `mail/welcome.html`).
//! Fingerprints are file modification times, so a hot-reload probe is a
//! single `stat` call.
//!
//! # Security
//!
//! The resolver validates that all resolved paths remain within the base path
//! to prevent directory traversal attacks (e.g., `../../../etc/passwd`).

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use stencil_template_core::Dialect;
use stencil_traits::{Fingerprint, ResolvedResource, ResourceError, ResourceResolver};

/// A resolver that loads templates from a directory on the local filesystem.
#[derive(Debug)]
pub struct FilesystemResolver {
    base_path: PathBuf,
    /// Canonicalized base path for security checks
    canonical_base: Option<PathBuf>,
}

impl FilesystemResolver {
    /// Creates a resolver rooted at `base_path`.
    ///
    /// The base path is canonicalized to enable security checks.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base = base_path.as_ref().to_path_buf();
        // May fail if the directory doesn't exist yet
        let canonical = base.canonicalize().ok();
        Self {
            base_path: base,
            canonical_base: canonical,
        }
    }

    /// Returns the template directory.
    pub fn base(&self) -> &Path {
        &self.base_path
    }

    /// Resolves and validates the file backing a template.
    ///
    /// Returns `None` if the path would escape the base directory.
    fn resolve_path_safe(&self, name: &str, dialect: Dialect) -> Option<PathBuf> {
        let relative = dialect.resource_path(name);
        let relative_path = Path::new(&relative);
        if relative_path.is_absolute() {
            return None;
        }
        if relative_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return None;
        }

        let full_path = self.base_path.join(relative_path);

        if let (Ok(canonical), Some(base)) = (full_path.canonicalize(), &self.canonical_base) {
            if canonical.starts_with(base) {
                return Some(canonical);
            }
            // Escapes through a symlink
            return None;
        }

        Some(full_path)
    }

    fn not_found(name: &str, dialect: Dialect) -> ResourceError {
        ResourceError::NotFound(dialect.resource_path(name))
    }

    fn fingerprint_of(path: &Path, name: &str, dialect: Dialect) -> Result<Fingerprint, ResourceError> {
        let metadata = std::fs::metadata(path).map_err(|e| map_io_error(e, name, dialect))?;
        let modified = metadata.modified().map_err(|e| ResourceError::LoadFailed {
            path: dialect.resource_path(name),
            message: format!("modification time unavailable: {}", e),
        })?;
        Ok(Fingerprint::Modified(modified))
    }
}

fn map_io_error(e: std::io::Error, name: &str, dialect: Dialect) -> ResourceError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ResourceError::NotFound(dialect.resource_path(name))
    } else {
        ResourceError::LoadFailed {
            path: dialect.resource_path(name),
            message: e.to_string(),
        }
    }
}

impl ResourceResolver for FilesystemResolver {
    fn resolve(&self, name: &str, dialect: Dialect) -> Result<ResolvedResource, ResourceError> {
        let path = self.resolve_path_safe(name, dialect).ok_or_else(|| {
            log::warn!("Blocked template path outside of {}: '{}'", self.base_path.display(), name);
            Self::not_found(name, dialect)
        })?;

        // Fingerprint first: a write racing with the read then shows up as a
        // changed fingerprint on the next probe.
        let fingerprint = Self::fingerprint_of(&path, name, dialect)?;
        let data = std::fs::read(&path).map_err(|e| map_io_error(e, name, dialect))?;
        log::debug!("Read template '{}' from {}", name, path.display());
        Ok(ResolvedResource {
            data: Arc::new(data),
            fingerprint,
        })
    }

    fn fingerprint(&self, name: &str, dialect: Dialect) -> Result<Fingerprint, ResourceError> {
        let path = self
            .resolve_path_safe(name, dialect)
            .ok_or_else(|| Self::not_found(name, dialect))?;
        Self::fingerprint_of(&path, name, dialect)
    }

    fn exists(&self, name: &str, dialect: Dialect) -> bool {
        self.resolve_path_safe(name, dialect)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "FilesystemResolver"
    }
}
