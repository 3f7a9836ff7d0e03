//! The template loader and cache.
//!
//! [`TemplateCache`] maps a [`TemplateId`] to its compiled form, compiling at
//! most once per identifier no matter how many threads ask at the same time.
//! Each identifier owns a cell with its own mutex; the map lock is only held
//! long enough to find or create that cell, so unrelated templates never wait
//! on each other.
//!
//! With hot reload enabled every lookup probes the fingerprints of the
//! template and of everything it includes, and recompiles when any changed.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use stencil_compiler::{CompiledTemplate, compile};
use stencil_parser::{IncludeResolver, Parser};
use stencil_template_core::{Dialect, DuplicatePolicy, Encoding, TemplateError, TemplateId};
use stencil_traits::{Fingerprint, ResourceResolver};

/// Settings for a [`TemplateCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Probe fingerprints on every lookup and recompile changed templates.
    pub hot_reload: bool,
    pub duplicate_policy: DuplicatePolicy,
}

/// An included resource and the fingerprint it had when it was compiled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub fingerprint: Fingerprint,
}

/// The result of compiling one template, successful or not.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: TemplateId,
    pub fingerprint: Fingerprint,
    pub dependencies: Vec<Dependency>,
    pub outcome: Result<Arc<CompiledTemplate>, TemplateError>,
    pub compiled_at: DateTime<Utc>,
}

/// A snapshot of cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub compilations: u64,
    pub failures: u64,
    pub reloads: u64,
    pub invalidations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    compilations: AtomicU64,
    failures: AtomicU64,
    reloads: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compilations: self.compilations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Per-identifier slot. Cells are created on first use and never removed.
#[derive(Debug, Default)]
struct EntryCell {
    entry: Mutex<Option<CacheEntry>>,
}

pub struct TemplateCache {
    resolver: Arc<dyn ResourceResolver>,
    config: CacheConfig,
    cells: RwLock<HashMap<TemplateId, Arc<EntryCell>>>,
    counters: Counters,
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("resolver", &self.resolver.name())
            .field("config", &self.config)
            .field("cells", &self.cells.read().map(|c| c.len()).unwrap_or(0))
            .finish()
    }
}

fn poisoned(what: &str) -> TemplateError {
    TemplateError::internal(format!("{} lock poisoned", what))
}

impl TemplateCache {
    pub fn new(resolver: Arc<dyn ResourceResolver>, config: CacheConfig) -> Self {
        Self {
            resolver,
            config,
            cells: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn resolver(&self) -> &Arc<dyn ResourceResolver> {
        &self.resolver
    }

    /// Returns the compiled template for `id`, compiling it if needed.
    ///
    /// Concurrent callers for the same identifier wait for a single
    /// compilation and all receive its result. Parse, structural and encoding
    /// failures are cached like successes; resource failures are not.
    pub fn get(&self, id: &TemplateId) -> Result<Arc<CompiledTemplate>, TemplateError> {
        let cell = self.cell(id)?;
        let mut slot = cell.entry.lock().map_err(|_| poisoned("cache entry"))?;

        match slot.as_ref() {
            Some(entry) if !self.config.hot_reload || self.is_fresh(entry) => {
                Counters::bump(&self.counters.hits);
                log::trace!("Cache hit for {}", id);
                return entry.outcome.clone();
            }
            Some(_) => {
                Counters::bump(&self.counters.reloads);
                log::info!("Template {} changed, recompiling", id);
            }
            None => Counters::bump(&self.counters.misses),
        }

        match self.load(id) {
            Ok(entry) => {
                let outcome = entry.outcome.clone();
                *slot = Some(entry);
                outcome
            }
            Err(e) => {
                // Serve nothing stale once the source is gone.
                *slot = None;
                Err(e)
            }
        }
    }

    /// Drops the cached result for `id`. Returns whether there was one.
    ///
    /// Waits for an in-flight compilation of the same identifier to finish.
    pub fn invalidate(&self, id: &TemplateId) -> Result<bool, TemplateError> {
        let cell = {
            let cells = self.cells.read().map_err(|_| poisoned("cache map"))?;
            match cells.get(id) {
                Some(cell) => Arc::clone(cell),
                None => return Ok(false),
            }
        };
        let mut slot = cell.entry.lock().map_err(|_| poisoned("cache entry"))?;
        let removed = slot.take().is_some();
        if removed {
            Counters::bump(&self.counters.invalidations);
            log::debug!("Invalidated {}", id);
        }
        Ok(removed)
    }

    /// Drops every cached result.
    pub fn clear(&self) -> Result<(), TemplateError> {
        for cell in self.all_cells()? {
            let mut slot = cell.entry.lock().map_err(|_| poisoned("cache entry"))?;
            if slot.take().is_some() {
                Counters::bump(&self.counters.invalidations);
            }
        }
        Ok(())
    }

    /// Number of identifiers with a cached result (success or failure).
    pub fn len(&self) -> usize {
        self.all_cells()
            .unwrap_or_default()
            .iter()
            .filter(|cell| cell.entry.lock().map(|e| e.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &TemplateId) -> bool {
        self.entry(id).is_some()
    }

    /// A copy of the cached entry for `id`, if any.
    pub fn entry(&self, id: &TemplateId) -> Option<CacheEntry> {
        let cell = self.cells.read().ok()?.get(id).cloned()?;
        let slot = cell.entry.lock().ok()?;
        slot.clone()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    fn cell(&self, id: &TemplateId) -> Result<Arc<EntryCell>, TemplateError> {
        {
            let cells = self.cells.read().map_err(|_| poisoned("cache map"))?;
            if let Some(cell) = cells.get(id) {
                return Ok(Arc::clone(cell));
            }
        }
        let mut cells = self.cells.write().map_err(|_| poisoned("cache map"))?;
        Ok(Arc::clone(cells.entry(id.clone()).or_default()))
    }

    fn all_cells(&self) -> Result<Vec<Arc<EntryCell>>, TemplateError> {
        let cells = self.cells.read().map_err(|_| poisoned("cache map"))?;
        Ok(cells.values().cloned().collect())
    }

    /// Whether the template and all of its includes still have the
    /// fingerprints they were compiled with. A failed probe counts as changed.
    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        let dialect = entry.id.dialect;
        let unchanged = |name: &str, fingerprint: &Fingerprint| {
            self.resolver
                .fingerprint(name, dialect)
                .is_ok_and(|current| current == *fingerprint)
        };
        unchanged(&entry.id.name, &entry.fingerprint)
            && entry
                .dependencies
                .iter()
                .all(|dep| unchanged(&dep.name, &dep.fingerprint))
    }

    /// Resolves and compiles a template into a cache entry.
    ///
    /// Returns `Err` only for failures that must not be cached.
    fn load(&self, id: &TemplateId) -> Result<CacheEntry, TemplateError> {
        let resource = self.resolver.resolve(&id.name, id.dialect)?;
        Counters::bump(&self.counters.compilations);

        let mut dependencies = Vec::new();
        let outcome = decode(&id.name, id.encoding, &resource.data).and_then(|source| {
            compile_source(
                self.resolver.as_ref(),
                &id.name,
                &source,
                id.dialect,
                id.encoding,
                self.config.duplicate_policy,
                &mut dependencies,
            )
        });

        let outcome = match outcome {
            Ok(compiled) => {
                if dependencies.is_empty() {
                    log::info!("Compiled template {}", id);
                } else {
                    log::info!(
                        "Compiled template {} (includes: {})",
                        id,
                        dependencies.iter().map(|d| d.name.as_str()).join(", ")
                    );
                }
                Ok(Arc::new(compiled))
            }
            Err(e) if e.is_compile_failure() => {
                Counters::bump(&self.counters.failures);
                log::warn!("Template {} failed to compile: {}", id, e);
                Err(e)
            }
            Err(e) => return Err(e),
        };

        Ok(CacheEntry {
            id: id.clone(),
            fingerprint: resource.fingerprint,
            dependencies,
            outcome,
            compiled_at: Utc::now(),
        })
    }
}

fn decode(name: &str, encoding: Encoding, bytes: &[u8]) -> Result<String, TemplateError> {
    encoding
        .decode(bytes)
        .map_err(|message| TemplateError::Encoding {
            name: name.to_string(),
            encoding,
            message,
        })
}

/// Loads included templates through the resolver and records what it loaded.
struct CollectingIncludes<'a> {
    resolver: &'a dyn ResourceResolver,
    encoding: Encoding,
    dependencies: &'a mut Vec<Dependency>,
}

impl IncludeResolver for CollectingIncludes<'_> {
    fn include(&mut self, name: &str, dialect: Dialect) -> Result<String, TemplateError> {
        let resource = self.resolver.resolve(name, dialect)?;
        if !self.dependencies.iter().any(|d| d.name == name) {
            self.dependencies.push(Dependency {
                name: name.to_string(),
                fingerprint: resource.fingerprint,
            });
        }
        decode(name, self.encoding, &resource.data)
    }
}

/// Parses and compiles `source`, resolving includes through `resolver`.
pub(crate) fn compile_source(
    resolver: &dyn ResourceResolver,
    name: &str,
    source: &str,
    dialect: Dialect,
    encoding: Encoding,
    policy: DuplicatePolicy,
    dependencies: &mut Vec<Dependency>,
) -> Result<CompiledTemplate, TemplateError> {
    let mut includes = CollectingIncludes {
        resolver,
        encoding,
        dependencies,
    };
    let doc = Parser::new(dialect)
        .with_duplicate_policy(policy)
        .parse_with_includes(name, source, &mut includes)?;
    log::debug!(
        "Parsed '{}': {} segments, {} identifiers",
        name,
        doc.len(),
        doc.declarations().len()
    );
    Ok(compile(&doc, name, dialect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stencil_traits::InMemoryResolver;

    fn cache_with(sources: &[(&str, &str)], hot_reload: bool) -> (Arc<InMemoryResolver>, TemplateCache) {
        let resolver = Arc::new(InMemoryResolver::new());
        for (name, source) in sources {
            resolver.add(*name, Dialect::Text, *source).unwrap();
        }
        let config = CacheConfig {
            hot_reload,
            ..CacheConfig::default()
        };
        let cache = TemplateCache::new(resolver.clone(), config);
        (resolver, cache)
    }

    fn id(name: &str) -> TemplateId {
        TemplateId::new(name, Dialect::Text)
    }

    #[test]
    fn test_get_compiles_once() {
        let (_, cache) = cache_with(&[("a", "A{{v:x/}}")], false);
        let first = cache.get(&id("a")).unwrap();
        let second = cache.get(&id("a")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.compilations, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failures_are_cached() {
        let (_, cache) = cache_with(&[("bad", "{{b:x}}")], false);
        let first = cache.get(&id("bad")).unwrap_err();
        let second = cache.get(&id("bad")).unwrap_err();
        assert_eq!(first, second);
        assert_eq!(cache.stats().compilations, 1);
        assert_eq!(cache.stats().failures, 1);
        assert!(cache.entry(&id("bad")).unwrap().outcome.is_err());
    }

    #[test]
    fn test_missing_resources_are_not_cached() {
        let (resolver, cache) = cache_with(&[], false);
        let err = cache.get(&id("later")).unwrap_err();
        assert!(matches!(err, TemplateError::ResourceUnavailable { .. }));
        assert!(!cache.contains(&id("later")));

        resolver.add("later", Dialect::Text, "now here").unwrap();
        assert!(cache.get(&id("later")).is_ok());
    }

    #[test]
    fn test_encoding_failures_are_cached() {
        let resolver = Arc::new(InMemoryResolver::new());
        resolver.add("latin", Dialect::Text, vec![b'c', b'a', b'f', 0xE9]).unwrap();
        let cache = TemplateCache::new(resolver, CacheConfig::default());

        let ascii = id("latin").with_encoding(Encoding::Ascii);
        let err = cache.get(&ascii).unwrap_err();
        assert!(matches!(err, TemplateError::Encoding { .. }));
        assert!(cache.contains(&ascii));

        let latin1 = id("latin").with_encoding(Encoding::Latin1);
        let compiled = cache.get(&latin1).unwrap();
        assert_eq!(compiled.instantiate().render_to_string().unwrap(), "café");
    }

    #[test]
    fn test_hot_reload_tracks_includes() {
        let (resolver, cache) = cache_with(&[("page", "[{{i:part/}}]"), ("part", "v1")], true);
        let t = cache.get(&id("page")).unwrap();
        assert_eq!(t.instantiate().render_to_string().unwrap(), "[v1]");
        let entry = cache.entry(&id("page")).unwrap();
        assert_eq!(entry.dependencies.len(), 1);
        assert_eq!(entry.dependencies[0].name, "part");

        resolver.add("part", Dialect::Text, "v2").unwrap();
        let t = cache.get(&id("page")).unwrap();
        assert_eq!(t.instantiate().render_to_string().unwrap(), "[v2]");
        assert_eq!(cache.stats().reloads, 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (_, cache) = cache_with(&[("a", "a"), ("b", "b")], false);
        cache.get(&id("a")).unwrap();
        cache.get(&id("b")).unwrap();

        assert!(cache.invalidate(&id("a")).unwrap());
        assert!(!cache.invalidate(&id("a")).unwrap());
        assert!(!cache.invalidate(&id("never")).unwrap());
        assert_eq!(cache.len(), 1);

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 2);

        cache.get(&id("a")).unwrap();
        assert_eq!(cache.stats().compilations, 3);
    }
}
