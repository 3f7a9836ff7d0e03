pub mod resource;
pub mod selector;

pub use resource::{
    Fingerprint, InMemoryResolver, ResolvedResource, ResourceError, ResourceResolver,
    SharedResourceData,
};
pub use selector::{FilterSelector, PreferenceSelector};
