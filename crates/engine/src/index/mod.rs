//! The reconciliation engine.
//!
//! [`Indexer::process_paths`] is the single entry point: it validates every
//! input path, then walks each one depth-first, comparing the live tree
//! against the record store and repairing whatever disagrees. Four
//! consistency checks run along the way:
//!
//! - **missing files**: records exist for files no longer in a directory;
//! - **missing subtrees**: records exist below subdirectories that are gone;
//! - **file shadows subtree**: records exist below a path that is now a file;
//! - **record shadows directory**: a file record's name is now a directory.
//!
//! Each check warns at detection and, when `remove_nonexistent_from_index`
//! is set, deletes the offending rows and says so. Case-collision duplicates
//! are the exception: they actively corrupt later equality checks, so they
//! are deleted unconditionally as soon as they are seen.

mod checks;
mod dedup;
mod walk;

use findex_fs::validate_target;
use findex_store::StoreHandle;
use std::path::PathBuf;

use crate::config::IndexerConfig;
use crate::error::{ErrorKind, Result};
use crate::logger::{Level, LoggerHandle};
use crate::stats::Stats;
use self::walk::Walk;

/// A configured reconciliation engine.
///
/// Holds no per-walk state: caches and counters live in a structure owned by
/// each `process_paths` call, which is what makes the "caches empty at the
/// end" invariant hold trivially between calls.
pub struct Indexer {
    config: IndexerConfig,
    store: StoreHandle,
    logger: LoggerHandle,
}

impl Indexer {
    /// Create an engine over a record store and a log sink.
    ///
    /// Fails if the configuration is invalid or if the store was built for a
    /// different matching mode than the configuration implies - silently
    /// mixing the two is exactly the kind of mismatch that produces
    /// wrong-case rows.
    pub fn new(store: StoreHandle, logger: LoggerHandle, config: IndexerConfig) -> Result<Self> {
        config.validate()?;
        if store.mode() != config.mode() {
            exn::bail!(ErrorKind::InvalidConfig(
                "store matching mode disagrees with the case sensitivity configuration"
            ));
        }
        Ok(Self { config, store, logger })
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Reconcile the index with the live filesystem under the given paths.
    ///
    /// Every input is validated first; one error line is logged per bad path
    /// and if *any* input was invalid, nothing is processed and
    /// [`InvalidPaths`](ErrorKind::InvalidPaths) comes back. Otherwise each
    /// path is walked in turn and the summary counters are reported at the
    /// end.
    ///
    /// The only mid-walk condition that aborts the call is a failed UPDATE
    /// ([`UpdateFailed`](ErrorKind::UpdateFailed)); everything else is
    /// logged, counted and walked past.
    pub async fn process_paths<S: AsRef<str>>(&self, paths: &[S]) -> Result<Stats> {
        let root = match tokio::fs::canonicalize(&self.config.allowed_base_directory).await {
            Ok(root) => root,
            Err(_) => {
                self.logger.log(
                    Level::Error,
                    format!(
                        "Allowed base directory '{}' cannot be resolved.",
                        self.config.allowed_base_directory.display()
                    ),
                );
                exn::bail!(ErrorKind::InvalidConfig("allowed_base_directory cannot be resolved"));
            },
        };

        let mut valid: Vec<PathBuf> = Vec::with_capacity(paths.len());
        let mut invalid = 0usize;
        for path in paths {
            let input = path.as_ref();
            let base = self.config.base_directory.as_deref();
            match validate_target(input, base, &root, true).await {
                Ok(absolute) => {
                    if needs_resolution_notice(input) {
                        self.logger
                            .log(Level::Debug, format!("Processing '{input}' as '{}'.", absolute.display()));
                    }
                    valid.push(absolute);
                },
                Err(err) => {
                    self.logger.log(Level::Error, validation_message(input, &err));
                    invalid += 1;
                },
            }
        }
        if invalid > 0 {
            exn::bail!(ErrorKind::InvalidPaths(invalid));
        }

        let mut walk = Walk::new(self, root);
        for absolute in valid {
            walk.process_file_or_dir(absolute).await?;
        }
        Ok(walk.finish())
    }
}

/// `.` and `./x` resolve where everyone expects; any other relative form
/// gets a debug line saying what it resolved to.
fn needs_resolution_notice(input: &str) -> bool {
    !input.starts_with('/') && input != "." && !input.starts_with("./")
}

fn validation_message(input: &str, err: &findex_fs::error::Error) -> String {
    use findex_fs::error::ErrorKind as Fs;
    match err.current_value() {
        Fs::NotFound(_) => format!("'{input}' does not exist."),
        Fs::NotADirectory(path) => format!("'{}' is not a directory.", path.display()),
        Fs::NotInAllowedBase(path) => {
            format!("'{}' is not inside the allowed base directory.", path.display())
        },
        _ => format!("Cannot process path '{input}': {}.", err.current_value()),
    }
}
