#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stencil::{
    Dialect, Fingerprint, InMemoryResolver, ResolvedResource, ResourceError, ResourceResolver,
    TemplateEngine,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// An in-memory resolver holding `sources`, all in `dialect`.
pub fn resolver_with(sources: &[(&str, &str)], dialect: Dialect) -> Arc<InMemoryResolver> {
    let resolver = Arc::new(InMemoryResolver::new());
    for (name, source) in sources {
        resolver
            .add(*name, dialect, *source)
            .expect("Failed to add template source");
    }
    resolver
}

/// An engine serving text templates from memory.
pub fn text_engine(sources: &[(&str, &str)]) -> TemplateEngine {
    TemplateEngine::builder()
        .with_resolver(resolver_with(sources, Dialect::Text))
        .build()
        .expect("Failed to build engine")
}

/// Wraps a resolver and counts how often template content is loaded.
#[derive(Debug)]
pub struct CountingResolver {
    inner: Arc<InMemoryResolver>,
    loads: AtomicUsize,
}

impl CountingResolver {
    pub fn new(inner: Arc<InMemoryResolver>) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ResourceResolver for CountingResolver {
    fn resolve(&self, name: &str, dialect: Dialect) -> Result<ResolvedResource, ResourceError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers could race.
        std::thread::sleep(std::time::Duration::from_millis(20));
        self.inner.resolve(name, dialect)
    }

    fn fingerprint(&self, name: &str, dialect: Dialect) -> Result<Fingerprint, ResourceError> {
        self.inner.fingerprint(name, dialect)
    }

    fn exists(&self, name: &str, dialect: Dialect) -> bool {
        self.inner.exists(name, dialect)
    }

    fn name(&self) -> &'static str {
        "CountingResolver"
    }
}
