//! SQL record store for the file index.
//!
//! This crate owns the persistent side of the index: the `file(fid, dir,
//! filename, <hash>)` table with its `(dir, filename)` uniqueness, and the
//! case-aware operations the reconciliation engine runs against it. The
//! database is not the source of truth - the files on disk are. If the
//! database is deleted, it can be rebuilt by reindexing the tree.
//!
//! # Architecture
//! - [`MatchingMode`] is the single answer to every case-sensitivity
//!   question: whether keys get lowercased, whether SQL needs `LOWER(…)`,
//!   which LIKE variant a backend uses, and when duplicates must be resolved.
//! - [`RecordStore`] is the operation set, implemented for SQLite,
//!   PostgreSQL and MySQL; consumers hold a [`StoreHandle`] and never know
//!   which dialect is underneath.

mod db;
pub mod error;
mod mode;
mod record;
mod store;

pub use crate::db::Database;
pub use crate::mode::MatchingMode;
pub use crate::record::{NewRecord, Record, join_rel};
pub use crate::store::{MySqlStore, PostgresStore, RecordStore, SqliteStore, StoreHandle};
