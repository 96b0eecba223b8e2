//! cf-core: shared types, IDs, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for all other cf-* crates,
//! providing type-safe identifiers, a unified error type, the closed set of
//! adapter kinds with their typed option schemas, application configuration,
//! and a broadcast event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;
pub mod options;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorKind, Result};
pub use ids::*;
pub use media::*;
pub use options::*;
