//! Core library: vocabularies, backends, ensembles, projects and the registry
//! that serves subject suggestions.

pub mod analyzer;
pub mod backend;
pub mod config;
pub mod corpus;
pub mod error;
pub mod eval;
pub mod project;
pub mod registry;
pub mod store;
pub mod suggestion;
pub mod transform;
pub mod vocab;

pub use error::{Result, SuggestError};
pub use registry::ProjectRegistry;
