//! ResourceResolver trait for abstracting template loading.
//!
//! This trait allows the engine to load template sources without being tied
//! to filesystem access. The engine never interprets paths itself; it hands a
//! logical name and a dialect to the resolver and receives bytes plus a
//! fingerprint it can compare on later requests.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use stencil_template_core::{Dialect, TemplateError};
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Failed to load resource '{path}': {message}")]
    LoadFailed { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(String),
}

impl ResourceError {
    /// The resource path the error refers to, when known.
    pub fn path(&self) -> Option<&str> {
        match self {
            ResourceError::NotFound(path) => Some(path),
            ResourceError::LoadFailed { path, .. } => Some(path),
            ResourceError::Io(_) => None,
        }
    }
}

impl From<std::io::Error> for ResourceError {
    fn from(err: std::io::Error) -> Self {
        ResourceError::Io(err.to_string())
    }
}

impl From<ResourceError> for TemplateError {
    fn from(err: ResourceError) -> Self {
        let name = err.path().unwrap_or("<unknown>").to_string();
        TemplateError::resource_unavailable(name, err.to_string())
    }
}

/// Shared resource data type (reference-counted bytes).
pub type SharedResourceData = Arc<Vec<u8>>;

/// A marker that changes whenever the underlying resource changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Last modification time reported by the resource's storage.
    Modified(SystemTime),
    /// SHA-256 digest of the resource content.
    Digest([u8; 32]),
}

impl Fingerprint {
    /// Fingerprints content by hashing it.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Fingerprint::Digest(Sha256::digest(bytes).into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Modified(time) => {
                let since_epoch = time
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_default();
                write!(f, "mtime:{}.{:09}", since_epoch.as_secs(), since_epoch.subsec_nanos())
            }
            Fingerprint::Digest(digest) => {
                f.write_str("sha256:")?;
                for byte in &digest[..8] {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// The bytes of a template resource together with its fingerprint.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub data: SharedResourceData,
    pub fingerprint: Fingerprint,
}

/// A trait for resolving logical template names to their source bytes.
///
/// # Implementations
///
/// - `FilesystemResolver`: Loads from a template directory (in `stencil-resource`)
/// - `InMemoryResolver`: Loads from pre-populated memory (always available)
pub trait ResourceResolver: Send + Sync + Debug {
    /// Load the source of a template.
    ///
    /// # Arguments
    ///
    /// * `name` - Slash- or dot-delimited logical template name
    /// * `dialect` - The dialect the template is requested in
    fn resolve(&self, name: &str, dialect: Dialect) -> Result<ResolvedResource, ResourceError>;

    /// Probe the current fingerprint without loading the content.
    ///
    /// Called on every cache hit when hot reload is enabled, so implementations
    /// should keep it cheap. The default loads the resource.
    fn fingerprint(&self, name: &str, dialect: Dialect) -> Result<Fingerprint, ResourceError> {
        self.resolve(name, dialect).map(|r| r.fingerprint)
    }

    /// Check if a template exists.
    fn exists(&self, name: &str, dialect: Dialect) -> bool;

    /// Returns a human-readable name for this resolver (for logging/debugging).
    fn name(&self) -> &'static str;
}

/// An in-memory template resolver.
///
/// Templates are stored in memory and must be pre-populated before use.
/// Fingerprints are content digests computed when a template is added, so
/// replacing a template's content is observed by hot reload.
#[derive(Debug, Default)]
pub struct InMemoryResolver {
    resources: RwLock<HashMap<(Dialect, String), ResolvedResource>>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a template source.
    ///
    /// # Errors
    ///
    /// Returns `ResourceError::LoadFailed` if the internal lock is poisoned.
    pub fn add(
        &self,
        name: impl Into<String>,
        dialect: Dialect,
        data: impl Into<Vec<u8>>,
    ) -> Result<(), ResourceError> {
        let name = name.into();
        let data = data.into();
        let resource = ResolvedResource {
            fingerprint: Fingerprint::of_bytes(&data),
            data: Arc::new(data),
        };
        let mut resources = self
            .resources
            .write()
            .map_err(|_| ResourceError::LoadFailed {
                path: name.clone(),
                message: "resource store lock poisoned".to_string(),
            })?;
        resources.insert((dialect, name), resource);
        Ok(())
    }

    /// Remove a template from the store.
    ///
    /// Returns `None` if the lock is poisoned or the template doesn't exist.
    pub fn remove(&self, name: &str, dialect: Dialect) -> Option<SharedResourceData> {
        self.resources
            .write()
            .ok()?
            .remove(&(dialect, name.to_string()))
            .map(|r| r.data)
    }

    /// Clear all templates from the store.
    ///
    /// Does nothing if the lock is poisoned.
    pub fn clear(&self) {
        if let Ok(mut resources) = self.resources.write() {
            resources.clear();
        }
    }

    /// Get the number of templates in the store.
    ///
    /// Returns 0 if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.resources.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Check if the store is empty.
    ///
    /// Returns `true` if the lock is poisoned (safe default).
    pub fn is_empty(&self) -> bool {
        self.resources.read().map(|r| r.is_empty()).unwrap_or(true)
    }

    fn lookup(&self, name: &str, dialect: Dialect) -> Result<ResolvedResource, ResourceError> {
        let resources = self
            .resources
            .read()
            .map_err(|_| ResourceError::LoadFailed {
                path: name.to_string(),
                message: "resource store lock poisoned".to_string(),
            })?;
        resources
            .get(&(dialect, name.to_string()))
            .cloned()
            .ok_or_else(|| ResourceError::NotFound(dialect.resource_path(name)))
    }
}

impl ResourceResolver for InMemoryResolver {
    fn resolve(&self, name: &str, dialect: Dialect) -> Result<ResolvedResource, ResourceError> {
        self.lookup(name, dialect)
    }

    fn fingerprint(&self, name: &str, dialect: Dialect) -> Result<Fingerprint, ResourceError> {
        self.lookup(name, dialect).map(|r| r.fingerprint)
    }

    fn exists(&self, name: &str, dialect: Dialect) -> bool {
        self.resources
            .read()
            .map(|r| r.contains_key(&(dialect, name.to_string())))
            .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "InMemoryResolver"
    }
}
