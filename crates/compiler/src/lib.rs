//! Compilation and rendering for Stencil templates.
//!
//! A [`Document`](stencil_parser::Document) is lowered once into a
//! [`CompiledTemplate`]: an immutable instruction array that any number of
//! threads can share. Each use creates a [`Template`], binds values on it and
//! renders to an [`OutputSink`]; render cost is proportional to what is
//! rendered, never to re-parsing.
//!
//! ```
//! use std::sync::Arc;
//! use stencil_compiler::compile_str;
//! use stencil_template_core::Dialect;
//!
//! let compiled = Arc::new(
//!     compile_str("hello", "Hello {{v:name/}}, welcome to {{b:place}}Earth{{/b:place}}.", Dialect::Text)
//!         .unwrap(),
//! );
//! let mut template = compiled.instantiate();
//! template.set_value("name", "Ada").unwrap();
//! assert_eq!(template.render_to_string().unwrap(), "Hello Ada, welcome to Earth.");
//! ```

pub mod compiler;
pub mod program;
pub mod render;
pub mod template;

pub use compiler::{compile, compile_str};
pub use program::{CodeRange, CompiledTemplate, Instruction, SlotId, SlotInfo};
pub use render::{IoSink, MAX_RENDER_DEPTH, MissingAlternative, OutputSink, RenderReport};
pub use template::Template;
