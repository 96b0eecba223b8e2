//! # cf-adapters
//!
//! Conversion adapters and external tool management for convertforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg,
//!   ffprobe, pdftoppm, pdftotext and dcraw.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support, binary stdout capture and streaming stderr.
//! - **Workspace management** ([`Workspace`]) -- temporary directory holding
//!   a job's materialized input and intermediate files.
//! - **Progress reporting** ([`ProgressSender`]) -- adapter-to-scheduler
//!   progress callback.
//! - **Conversion functions** ([`convert`]) -- document, image, raw-image,
//!   audio and video.
//! - **Dispatch** ([`ConversionBackend`], [`Adapters`]) -- the seam the
//!   scheduler calls through.

pub mod backend;
pub mod command;
pub mod convert;
pub mod progress;
pub mod tools;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use backend::{Adapters, ConversionBackend};
pub use command::{ToolCommand, ToolOutput};
pub use progress::ProgressSender;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry, KNOWN_TOOLS};
pub use workspace::Workspace;
