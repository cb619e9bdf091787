//! Error types for LinkGraph.
//!
//! Library crates use [`LinkGraphError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LinkGraph operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkGraphError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the content source.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed input document or response body.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Key-value store error (connectivity, SQL, row decoding).
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad seed file, unknown table name, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Point lookup found no node record for the title.
    #[error("no node record for {title:?}")]
    NodeNotFound { title: String },

    /// The edge upsert kept racing a concurrent creator until its retry budget ran out.
    #[error("edge {source_title:?} -> {destination:?} still conflicting after {attempts} attempts")]
    EdgeWriteConflict {
        source_title: String,
        destination: String,
        attempts: u32,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LinkGraphError>;

impl LinkGraphError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap any store-level error message.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
