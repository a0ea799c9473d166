//! Reconciliation engine for the findex file index.
//!
//! The index is a table of `(dir, filename, hash)` rows under an allowed
//! root directory; this crate keeps it consistent with the live filesystem.
//! [`Indexer::process_paths`] walks the given paths depth-first, inserts
//! records for new files, updates changed ones, and runs four consistency
//! checks that catch everything renames, re-casings and file/directory
//! swaps can do to an index - under any combination of filesystem and
//! database case-sensitivity.
//!
//! The engine is logically single-threaded: one walk at a time, sequential
//! awaits, no transactions. Concurrent writers against the same table are
//! not supported.
//!
//! ```no_run
//! use std::sync::Arc;
//! use findex_engine::{Indexer, IndexerConfig, TracingLogger};
//! use findex_store::{Database, SqliteStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IndexerConfig::new("/library").with_remove_nonexistent_from_index(true);
//! let db = Database::connect("/library/.index.db", config.mode()).await?;
//! let store = SqliteStore::new(&db, config.table.clone(), &config.cache_fields)?;
//! store.ensure_schema().await?;
//!
//! let indexer = Indexer::new(Arc::new(store), Arc::new(TracingLogger), config)?;
//! let stats = indexer.process_paths(&["/library"]).await?;
//! println!("added {} file(s)", stats.new);
//! # Ok(())
//! # }
//! ```

mod config;
pub mod error;
mod index;
mod logger;
mod stats;

pub use crate::config::IndexerConfig;
pub use crate::index::Indexer;
pub use crate::logger::{Level, Logger, LoggerHandle, MemoryLogger, TracingLogger};
pub use crate::stats::Stats;
