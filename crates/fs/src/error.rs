//! Filesystem Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A filesystem error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Path (or its parent) does not exist
    #[display("path not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Trailing slash on something that isn't a directory
    #[display("not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Resolved path is neither equal to nor below the allowed root
    #[display("path escapes the allowed base directory: {}", _0.display())]
    NotInAllowedBase(#[error(not(source))] PathBuf),
    /// Path cannot be represented (empty, non-UTF8, …)
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Unknown hash algorithm name
    #[display("unsupported hash algorithm: {_0}")]
    UnsupportedAlgo(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
