//! Unified error type for the convertforge workspace.
//!
//! Every crate funnels its failures into [`Error`]. The scheduler never lets
//! an adapter error escape: it converts them into job state, and uses
//! [`Error::kind`] / [`Error::retryable`] to describe what went wrong.

use std::fmt;

/// Unified error type covering all failure modes in convertforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation is not allowed in the entity's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A job referenced an adapter kind that does not exist.
    #[error("Unknown adapter kind: {0}")]
    UnknownAdapterKind(String),

    /// A conversion adapter failed (returned an error or panicked).
    #[error("Adapter error [{kind}]: {message}")]
    Adapter {
        /// The adapter kind that failed.
        kind: String,
        /// Human-readable error description.
        message: String,
    },

    /// Building a delivery archive failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// An external tool (ffmpeg, pdftoppm, dcraw, ...) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    InvalidState,
    UnknownAdapterKind,
    AdapterInvocation,
    ArchiveAssembly,
    Io,
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::UnknownAdapterKind(_) => ErrorKind::UnknownAdapterKind,
            Error::Adapter { .. } | Error::Tool { .. } => ErrorKind::AdapterInvocation,
            Error::Archive(_) => ErrorKind::ArchiveAssembly,
            Error::Io { .. } => ErrorKind::Io,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same operation may succeed.
    ///
    /// Adapter, tool, archive and I/O failures are transient from the queue's
    /// point of view; configuration and validation errors are not.
    pub fn retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AdapterInvocation | ErrorKind::ArchiveAssembly | ErrorKind::Io
        )
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Adapter`].
    pub fn adapter(kind: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::Adapter {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Archive`].
    pub fn archive(message: impl fmt::Display) -> Self {
        Error::Archive(message.to_string())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
