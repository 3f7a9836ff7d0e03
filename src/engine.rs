//! The engine facade: a configured cache plus the selector handed to every
//! template it produces.

use crate::cache::{TemplateCache, compile_source};
use crate::config::EngineConfig;
use std::path::Path;
use std::sync::Arc;
use stencil_compiler::{CompiledTemplate, Template};
use stencil_resource::FilesystemResolver;
use stencil_template_core::{Dialect, DuplicatePolicy, Encoding, TemplateError, TemplateId};
use stencil_traits::{FilterSelector, ResourceResolver};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub struct TemplateEngine {
    cache: TemplateCache,
    selector: Option<Arc<dyn FilterSelector>>,
    config: EngineConfig,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("cache", &self.cache)
            .field("selector", &self.selector)
            .field("config", &self.config)
            .finish()
    }
}

impl TemplateEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn selector(&self) -> Option<&Arc<dyn FilterSelector>> {
        self.selector.as_ref()
    }

    /// The shared compiled form of a template.
    pub fn compiled(&self, id: &TemplateId) -> Result<Arc<CompiledTemplate>, TemplateError> {
        self.cache.get(id)
    }

    /// A fresh instance of `name`, decoded with the configured encoding.
    pub fn template(&self, name: &str, dialect: Dialect) -> Result<Template, TemplateError> {
        let id = TemplateId::new(name, dialect).with_encoding(self.config.encoding);
        self.template_for(&id)
    }

    pub fn template_for(&self, id: &TemplateId) -> Result<Template, TemplateError> {
        let compiled = self.cache.get(id)?;
        Ok(self.instantiate(&compiled))
    }

    /// Compiles a source string without caching it. Include tags are still
    /// resolved through the engine's resolver.
    pub fn compile_source(
        &self,
        name: &str,
        source: &str,
        dialect: Dialect,
    ) -> Result<Template, TemplateError> {
        let mut dependencies = Vec::new();
        let compiled = compile_source(
            self.cache.resolver().as_ref(),
            name,
            source,
            dialect,
            self.config.encoding,
            self.config.duplicate_policy,
            &mut dependencies,
        )?;
        Ok(self.instantiate(&Arc::new(compiled)))
    }

    /// Compiles a set of templates ahead of use, in parallel when the
    /// `parallel` feature is enabled. Results are in the order of `ids`.
    pub fn preload(&self, ids: &[TemplateId]) -> Vec<Result<Arc<CompiledTemplate>, TemplateError>> {
        log::debug!("Preloading {} templates", ids.len());
        #[cfg(feature = "parallel")]
        let results = ids.par_iter().map(|id| self.cache.get(id)).collect();
        #[cfg(not(feature = "parallel"))]
        let results = ids.iter().map(|id| self.cache.get(id)).collect();
        results
    }

    fn instantiate(&self, compiled: &Arc<CompiledTemplate>) -> Template {
        let mut template = compiled.instantiate();
        template.set_selector(self.selector.clone());
        template
    }
}

/// A builder for creating a [`TemplateEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    resolver: Option<Arc<dyn ResourceResolver>>,
    selector: Option<Arc<dyn FilterSelector>>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads templates through `resolver`. Takes precedence over a template directory.
    pub fn with_resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Loads templates from a directory on the local filesystem.
    pub fn with_template_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.template_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_hot_reload(mut self, hot_reload: bool) -> Self {
        self.config.hot_reload = hot_reload;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicate_policy = policy;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    pub fn with_selector(mut self, selector: Arc<dyn FilterSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Replaces all configuration settings.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<TemplateEngine, TemplateError> {
        let resolver: Arc<dyn ResourceResolver> = match (self.resolver, &self.config.template_dir) {
            (Some(resolver), _) => resolver,
            (None, Some(dir)) => {
                if !dir.is_dir() {
                    return Err(TemplateError::config(format!(
                        "template directory '{}' does not exist",
                        dir.display()
                    )));
                }
                Arc::new(FilesystemResolver::new(dir))
            }
            (None, None) => {
                return Err(TemplateError::config(
                    "No template source has been configured. Use `with_resolver` or `with_template_dir`.",
                ));
            }
        };

        log::info!(
            "Template engine using {} (hot reload {})",
            resolver.name(),
            if self.config.hot_reload { "on" } else { "off" }
        );
        Ok(TemplateEngine {
            cache: TemplateCache::new(resolver, self.config.cache_config()),
            selector: self.selector,
            config: self.config,
        })
    }
}
