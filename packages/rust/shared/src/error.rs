//! Error types for FeedScout.
//!
//! Library crates use [`FeedScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only store-level and configuration-level failures surface as
//! [`FeedScoutError`] from a run; per-candidate failures are folded into
//! validation outcomes by the agents and never propagate this far.

use std::path::PathBuf;

/// Top-level error type for all FeedScout operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedScoutError {
    /// Configuration loading or validation error (run-fatal, raised before any work).
    #[error("config error: {message}")]
    Config { message: String },

    /// Validation store could not be loaded, saved, or leased (run-fatal).
    #[error("store error: {0}")]
    Store(String),

    /// Network/HTTP error outside of per-candidate validation.
    #[error("network error: {0}")]
    Network(String),

    /// Seed list or document parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FeedScoutError>;

impl FeedScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a store error from any displayable message.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
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
}
