//! Core types shared by every stage of the Stencil template engine.
//!
//! This crate holds the vocabulary the parser, compiler, runtime and cache
//! agree on:
//!
//! - **`Dialect`**: the template sub-language (markup, text, data) and its syntax table
//! - **`TemplateId`** / **`Encoding`**: how a template resource is named and decoded
//! - **`DuplicatePolicy`**: what a repeated identifier means inside one template
//! - **`TemplateError`**: the error taxonomy, from syntax errors to render failures

pub mod dialect;
pub mod error;
pub mod id;

pub use dialect::{Delimiters, Dialect};
pub use error::{
    Location, ParseError, ParseErrorKind, RenderError, StructuralError, StructuralErrorKind,
    TemplateError,
};
pub use id::{DuplicatePolicy, Encoding, TemplateId};
