//! convertforge - bulk file conversion with bounded concurrency and bundled
//! delivery.
//!
//! The binary is a thin shell over the workspace crates; this library crate
//! exposes the pieces the CLI wires together so they can be tested directly.

pub mod batch;
pub mod config;

pub use cf_adapters as adapters;
pub use cf_bundle as bundle;
pub use cf_core as types;
pub use cf_queue as queue;
