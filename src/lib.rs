//! Stencil: a compiled template engine.
//!
//! Templates mix literal text with named value slots, nested blocks and
//! filtered (selectable) fragments. A template is parsed and compiled once
//! into an immutable instruction array, cached per identifier, and then
//! instantiated as often as needed; each instance carries its own bindings.
//!
//! ```
//! use std::sync::Arc;
//! use stencil::{Dialect, InMemoryResolver, TemplateEngine};
//!
//! let resolver = Arc::new(InMemoryResolver::new());
//! resolver
//!     .add("hello", Dialect::Text, "Hello {{v:name/}}, welcome to {{b:place}}Earth{{/b:place}}.")
//!     .unwrap();
//!
//! let engine = TemplateEngine::builder().with_resolver(resolver).build().unwrap();
//! let mut template = engine.template("hello", Dialect::Text).unwrap();
//! template.set_value("name", "Ada").unwrap();
//! template.set_value("place", "Mars").unwrap();
//! assert_eq!(template.render_to_string().unwrap(), "Hello Ada, welcome to Mars.");
//! ```
//!
//! ## Crates
//!
//! - `stencil-template-core`: dialects, identifiers and the error taxonomy
//! - `stencil-traits`: resource resolver and filter selector seams
//! - `stencil-resource`: filesystem resolver
//! - `stencil-parser`: lexer, parser and document model
//! - `stencil-compiler`: compiler, render loop and runtime instances

pub mod cache;
pub mod config;
pub mod engine;

pub use cache::{CacheConfig, CacheEntry, CacheStats, Dependency, TemplateCache};
pub use config::EngineConfig;
pub use engine::{EngineBuilder, TemplateEngine};

pub use stencil_compiler::{
    CompiledTemplate, IoSink, MissingAlternative, OutputSink, RenderReport, Template, compile,
    compile_str,
};
pub use stencil_parser::{Document, Parser};
pub use stencil_resource::FilesystemResolver;
pub use stencil_template_core::{
    Dialect, DuplicatePolicy, Encoding, Location, ParseError, ParseErrorKind, RenderError,
    StructuralError, StructuralErrorKind, TemplateError, TemplateId,
};
pub use stencil_traits::{
    FilterSelector, Fingerprint, InMemoryResolver, PreferenceSelector, ResolvedResource,
    ResourceError, ResourceResolver,
};
