//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Most things that go wrong during a walk are *not* errors in this sense:
//! they get logged, bump a counter and the walk continues. The kinds below
//! are the ones that abort the call tree, because continuing would risk
//! writing through a cached view that no longer matches the database.

use derive_more::{Display, Error};

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("invalid configuration: {_0}")]
    InvalidConfig(#[error(not(source))] &'static str),
    /// One or more input paths failed validation; nothing was processed.
    #[display("{_0} input path(s) failed validation")]
    InvalidPaths(#[error(not(source))] usize),
    /// A failed UPDATE means the cached view and the database disagree.
    /// An incomplete insert leaves a consistent index; this does not.
    #[display("failed to update indexed record {_0}; the cached view and the database disagree")]
    UpdateFailed(#[error(not(source))] i64),
    #[display("record store error")]
    Store,
    #[display("filesystem error")]
    Filesystem,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store | Self::Filesystem)
    }
}
