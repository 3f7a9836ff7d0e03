//! Template resolvers for the Stencil engine.
//!
//! This crate provides platform-specific implementations of the
//! `ResourceResolver` trait from stencil-traits.
//!
//! ## Available Resolvers
//!
//! - [`FilesystemResolver`]: Loads templates from a directory on the local filesystem
//!
//! ## Re-exports
//!
//! For convenience, we also re-export the in-memory resolver from stencil-traits:
//! - [`InMemoryResolver`]: Pre-populated in-memory storage

mod filesystem;

pub use filesystem::FilesystemResolver;

pub use stencil_traits::InMemoryResolver;
