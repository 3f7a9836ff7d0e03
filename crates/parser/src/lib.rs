//! Parsing for Stencil templates.
//!
//! [`Parser`] turns source text into a [`Document`]: a flat list of text and
//! tag segments with every identifier indexed and every structural rule
//! checked. Nothing downstream has to re-validate a `Document`.
//!
//! ```
//! use stencil_parser::Parser;
//! use stencil_template_core::Dialect;
//!
//! let doc = Parser::new(Dialect::Text)
//!     .parse("Hello {{v:name/}}, welcome to {{b:place}}Earth{{/b:place}}.")
//!     .unwrap();
//! assert_eq!(doc.identifiers(), vec!["name", "place"]);
//! assert_eq!(doc.default_content("place").as_deref(), Some("Earth"));
//! ```

pub mod document;
mod lexer;
pub mod parser;
mod tag;

pub use document::{
    AlternativeDecl, Declaration, DeclarationKind, Document, MAX_NESTING_DEPTH, Segment, Tag,
    TagKind,
};
pub use parser::{IncludeResolver, MAX_INCLUDE_DEPTH, NoIncludes, Parser};
