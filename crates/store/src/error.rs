//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database schema error")]
    Schema,
    /// Table or column name rejected before it could reach an SQL string.
    #[display("invalid identifier: {_0}")]
    InvalidIdentifier(#[error(not(source))] String),
    #[display("cache_fields must contain at least the hash column")]
    EmptyCacheFields,
    /// Row contained something the record model cannot represent.
    #[display("invalid record data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
