//! Record store trait and backend implementations.
//!
//! This module defines the `RecordStore` trait, which provides a unified
//! interface over the index table for the three supported database families
//! (SQLite, PostgreSQL, MySQL). Each backend encodes its own dialect for the
//! case-aware comparisons: which operations wrap columns in `LOWER(…)`, which
//! LIKE variant performs a case-insensitive range match, and how inserted row
//! ids come back.

mod mysql;
mod postgres;
mod sqlite;

pub use self::mysql::MySqlStore;
pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

use crate::error::{ErrorKind, Result};
use crate::mode::MatchingMode;
use crate::record::{NewRecord, Record};
use async_trait::async_trait;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn RecordStore + Send + Sync>;

/// Unified interface over the index table.
///
/// Every operation that selects or matches on `dir`/`filename` is case-aware:
/// the active [`MatchingMode`] decides whether the SQL needs explicit
/// lowering, or whether the column collation already matches the way the
/// filesystem compares names. Values passed in for *matching* may be in any
/// casing (backends normalize them through [`MatchingMode::key`]); values
/// passed in for *writing* are stored exactly as given.
///
/// Implementations do not open transactions; each statement auto-commits.
/// Concurrent writers against the same table are unsupported.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The matching mode this store was built for. Must agree with the
    /// engine configuration driving it.
    fn mode(&self) -> MatchingMode;

    /// All records whose `dir` matches the given relative directory,
    /// ordered by `(dir, filename)` so duplicate resolution and log output
    /// are deterministic.
    async fn fetch_dir_records(&self, dir: &str) -> Result<Vec<Record>>;

    /// The records matching one `(dir, filename)` pair. More than one row
    /// can come back when a case-sensitive database holds case-colliding
    /// duplicates; the caller resolves those.
    async fn fetch_one(&self, dir: &str, filename: &str) -> Result<Vec<Record>>;

    /// Distinct first-level subdirectory names appearing in stored `dir`
    /// values strictly below the given directory (all non-empty dirs when
    /// called for the root). Values retain their original casing and may
    /// include several casings of the same logical name.
    async fn fetch_subdir_names(&self, dir: &str) -> Result<Vec<String>>;

    /// Insert a record, returning the assigned `fid`.
    async fn insert(&self, record: &NewRecord) -> Result<i64>;

    /// Rewrite `dir`, `filename` and the hash column of one record,
    /// returning the number of affected rows.
    async fn update(&self, fid: i64, record: &NewRecord) -> Result<u64>;

    /// Delete one record by id, returning the number of affected rows.
    async fn delete_by_fid(&self, fid: i64) -> Result<u64>;

    /// Delete the named files inside one directory, returning the number of
    /// affected rows.
    async fn delete_files_in_dir(&self, dir: &str, filenames: &[String]) -> Result<u64>;

    /// Delete every record at or below the given relative path: rows whose
    /// `dir` equals it, plus rows whose `dir` starts with it followed by
    /// `/`. Returns the number of affected rows.
    async fn delete_subtree(&self, dir: &str) -> Result<u64>;
}

/// Validated table layout shared by all backends.
///
/// Identifier validation happens here, once, so the dynamically-built SQL
/// never interpolates anything but `[A-Za-z0-9_]` names.
#[derive(Debug, Clone)]
pub(crate) struct TableSpec {
    pub(crate) table: String,
    pub(crate) hash_field: String,
    pub(crate) extra_fields: Vec<String>,
    pub(crate) mode: MatchingMode,
}

impl TableSpec {
    pub(crate) fn new(table: impl Into<String>, cache_fields: &[String], mode: MatchingMode) -> Result<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            exn::bail!(ErrorKind::InvalidIdentifier(table));
        }
        let mut fields = cache_fields.iter();
        let Some(hash_field) = fields.next() else {
            exn::bail!(ErrorKind::EmptyCacheFields);
        };
        let extra_fields: Vec<String> = fields.cloned().collect();
        for field in std::iter::once(hash_field).chain(&extra_fields) {
            // fid/dir/filename are owned by the store; a cache field shadowing
            // them would produce a duplicate column in the SELECT list.
            if !is_identifier(field) || matches!(field.as_str(), "fid" | "dir" | "filename") {
                exn::bail!(ErrorKind::InvalidIdentifier(field.clone()));
            }
        }
        Ok(Self { table, hash_field: hash_field.clone(), extra_fields, mode })
    }

    /// `fid, dir, filename, <hash>[, extras]` in the fixed column order the
    /// backends' row readers rely on.
    pub(crate) fn select_list(&self) -> String {
        let mut columns = vec!["fid".to_owned(), "dir".to_owned(), "filename".to_owned(), self.hash_field.clone()];
        columns.extend(self.extra_fields.iter().cloned());
        columns.join(", ")
    }

    /// The LIKE pattern matching everything strictly below `dir`.
    pub(crate) fn subtree_pattern(&self, dir: &str) -> String {
        format!("{}/%", escape_like(&self.mode.key(dir)))
    }

    /// Character position (1-based) where a subdirectory name starts in a
    /// `dir` value below the given directory. SQL `substr` functions count
    /// characters, not bytes.
    pub(crate) fn tail_start(&self, dir: &str) -> i64 {
        if dir.is_empty() { 1 } else { dir.chars().count() as i64 + 2 }
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Escape a value for use inside a LIKE pattern with `\` as escape character.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(TableSpec::new("file", &["sha256".into()], MatchingMode::SensitiveBoth).is_ok());
        assert!(TableSpec::new("file index", &["sha256".into()], MatchingMode::SensitiveBoth).is_err());
        assert!(TableSpec::new("file", &[], MatchingMode::SensitiveBoth).is_err());
        assert!(TableSpec::new("file", &["sha256; DROP TABLE file".into()], MatchingMode::SensitiveBoth).is_err());
        // cache fields must not shadow the fixed columns
        assert!(TableSpec::new("file", &["dir".into()], MatchingMode::SensitiveBoth).is_err());
        assert!(TableSpec::new("file", &["sha256".into(), "filename".into()], MatchingMode::SensitiveBoth).is_err());
        assert!(TableSpec::new("file", &["1sha".into()], MatchingMode::SensitiveBoth).is_err());
    }

    #[test]
    fn test_select_list() {
        let spec = TableSpec::new("file", &["sha256".into(), "mtime".into()], MatchingMode::SensitiveBoth).unwrap();
        assert_eq!(spec.select_list(), "fid, dir, filename, sha256, mtime");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%_done"), "50\\%\\_done");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_subtree_pattern_and_tail_start() {
        let spec = TableSpec::new("file", &["sha256".into()], MatchingMode::SensitiveBoth).unwrap();
        assert_eq!(spec.subtree_pattern("aa/bb"), "aa/bb/%");
        assert_eq!(spec.tail_start("aa/bb"), 7);
        assert_eq!(spec.tail_start(""), 1);
        // keyed under insensitive matching
        let spec = TableSpec::new("file", &["sha256".into()], MatchingMode::InsensitiveFs).unwrap();
        assert_eq!(spec.subtree_pattern("AA"), "aa/%");
    }
}
