//! Per-call walk state and the traversal itself.

use exn::ResultExt;
use findex_fs::{hash_file, list_dir, relative_to_root, split_rel};
use findex_store::{MatchingMode, NewRecord, Record, RecordStore};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};

use crate::config::IndexerConfig;
use crate::error::{ErrorKind, Result};
use crate::index::Indexer;
use crate::logger::Level;
use crate::stats::Stats;

/// Everything one `process_paths` call owns: the two caches and the
/// counters. Dropped when the call returns, so no state leaks between
/// invocations.
///
/// `records_cache` maps a directory key to that directory's records by
/// filename key; `subdirs_cache` maps it to the distinct first-level
/// subdirectory names stored below it. Keys are lowercased exactly when
/// case-insensitive matching is active; the cached values always keep their
/// stored casing. Both entries for a directory appear when the walk enters
/// it and disappear when the walk leaves it.
pub(crate) struct Walk<'a> {
    indexer: &'a Indexer,
    root: PathBuf,
    pub(crate) records_cache: HashMap<String, HashMap<String, Record>>,
    pub(crate) subdirs_cache: HashMap<String, Vec<String>>,
    pub(crate) stats: Stats,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(indexer: &'a Indexer, root: PathBuf) -> Self {
        Self {
            indexer,
            root,
            records_cache: HashMap::new(),
            subdirs_cache: HashMap::new(),
            stats: Stats::default(),
        }
    }

    pub(crate) fn config(&self) -> &IndexerConfig {
        &self.indexer.config
    }

    pub(crate) fn mode(&self) -> MatchingMode {
        self.indexer.config.mode()
    }

    pub(crate) fn store(&self) -> &dyn RecordStore {
        self.indexer.store.as_ref()
    }

    pub(crate) fn log(&self, level: Level, message: String) {
        self.indexer.logger.log(level, message);
    }

    fn rel_of(&self, absolute: &Path) -> Result<String> {
        relative_to_root(absolute, &self.root).or_raise(|| ErrorKind::Filesystem)
    }

    /// Report the counters and hand them back. A walk that ends with
    /// populated caches is a bug in the traversal, not in the tree; say so.
    pub(crate) fn finish(self) -> Stats {
        if !self.records_cache.is_empty() || !self.subdirs_cache.is_empty() {
            self.log(
                Level::Warning,
                format!(
                    "Walk finished with {} directory cache(s) still populated; code error?",
                    self.records_cache.len().max(self.subdirs_cache.len())
                ),
            );
        }
        self.stats.report(self.indexer.logger.as_ref());
        self.stats
    }

    /// Dispatch one absolute path to the file or directory processor.
    ///
    /// Boxed because the directory processor recurses back into this for
    /// every child. A path that disappeared since it was listed is logged
    /// and counted, not fatal - the filesystem is allowed to change under a
    /// running walk.
    pub(crate) fn process_file_or_dir(&mut self, absolute: PathBuf) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let meta = match tokio::fs::symlink_metadata(&absolute).await {
                Ok(meta) => meta,
                Err(_) => {
                    self.log(Level::Error, format!("'{}' can no longer be read.", absolute.display()));
                    self.stats.errors += 1;
                    return Ok(());
                },
            };
            if meta.is_symlink() {
                if !self.config().process_symlinks {
                    self.log(Level::Error, format!("'{}' is a symlink; this is not supported.", absolute.display()));
                    self.stats.symlinks_skipped += 1;
                    return Ok(());
                }
                // Index the link under its own name; follow it only to find
                // out whether to treat it as a file or a directory.
                return match tokio::fs::metadata(&absolute).await {
                    Ok(target) if target.is_dir() => self.process_directory(&absolute).await,
                    Ok(_) => self.process_file(&absolute).await,
                    Err(_) => {
                        self.log(Level::Error, format!("'{}' is a dangling symlink.", absolute.display()));
                        self.stats.errors += 1;
                        Ok(())
                    },
                };
            }
            if meta.is_dir() {
                self.process_directory(&absolute).await
            } else {
                self.process_file(&absolute).await
            }
        })
    }

    async fn process_directory(&mut self, absolute: &Path) -> Result<()> {
        let dir_rel = self.rel_of(absolute)?;
        let dir_key = self.mode().key(&dir_rel);

        // An indexed *file* by this directory's name is stale by definition.
        self.check_record_shadows_directory(&dir_rel).await?;

        let entries = match list_dir(absolute, self.config().sort_directory_entries).await {
            Ok(entries) => entries,
            Err(err) => {
                self.log(
                    Level::Error,
                    format!("Error reading directory '{}': {}.", absolute.display(), err.current_value()),
                );
                self.stats.errors += 1;
                return Ok(());
            },
        };
        let names = self.read_directory(&dir_rel, &dir_key, entries).await?;

        let result = self.walk_entries(absolute, names).await;

        // Caches for this directory are released on every exit path; the
        // imbalance warning only makes sense when nothing is unwinding.
        let records_present = self.records_cache.remove(&dir_key).is_some();
        let subdirs_present = self.subdirs_cache.remove(&dir_key).is_some();
        if result.is_ok() {
            if !records_present {
                self.log(
                    Level::Warning,
                    format!("Records cache for directory '{dir_rel}' vanished during processing; code error?"),
                );
            }
            if !subdirs_present {
                self.log(
                    Level::Warning,
                    format!("Subdirectory cache for directory '{dir_rel}' vanished during processing; code error?"),
                );
            }
        }
        result
    }

    async fn walk_entries(&mut self, absolute: &Path, names: Vec<String>) -> Result<()> {
        for name in names {
            self.process_file_or_dir(absolute.join(&name)).await?;
        }
        Ok(())
    }

    /// Populate the caches for one directory and run the directory-scope
    /// consistency checks. Returns the (possibly deduplicated) list of
    /// child names to descend into.
    async fn read_directory(
        &mut self,
        dir_rel: &str,
        dir_key: &str,
        entries: Vec<findex_fs::DirEntry>,
    ) -> Result<Vec<String>> {
        let mode = self.mode();

        // A case-sensitive filesystem can hand us AA next to aa; a
        // case-insensitive database cannot hold both. Keep the first in
        // enumeration order, which deliberately depends on readdir order
        // unless sort_directory_entries says otherwise.
        let mut names: Vec<String> = Vec::with_capacity(entries.len());
        if mode.dedup_listing() {
            let mut first_seen: HashMap<String, String> = HashMap::new();
            for entry in &entries {
                match first_seen.entry(entry.name.to_lowercase()) {
                    Entry::Occupied(kept) => {
                        self.log(
                            Level::Warning,
                            format!(
                                "Directory '{dir_rel}' contains entries for both {} and {}; these cannot both be \
                                 indexed in a case insensitive database. Skipping the latter file.",
                                kept.get(),
                                entry.name,
                            ),
                        );
                    },
                    Entry::Vacant(slot) => {
                        slot.insert(entry.name.clone());
                        names.push(entry.name.clone());
                    },
                }
            }
        } else {
            names.extend(entries.iter().map(|entry| entry.name.clone()));
        }

        let mut records = self.store().fetch_dir_records(dir_key).await.or_raise(|| ErrorKind::Store)?;
        if mode.needs_record_dedup() {
            records = self.deduplicate_records(records, dir_rel, &names).await?;
        }
        let mut cache = HashMap::with_capacity(records.len());
        for record in records {
            cache.insert(mode.key(&record.filename), record);
        }
        self.records_cache.insert(dir_key.to_owned(), cache);

        let subdirs = self.store().fetch_subdir_names(dir_key).await.or_raise(|| ErrorKind::Store)?;
        self.subdirs_cache.insert(dir_key.to_owned(), subdirs);

        self.check_missing_files(dir_rel, dir_key, &names).await?;
        self.check_missing_subdirs(dir_rel, dir_key, &names).await?;
        Ok(names)
    }

    async fn process_file(&mut self, absolute: &Path) -> Result<()> {
        let file_rel = self.rel_of(absolute)?;
        let (dir_rel, filename) = split_rel(&file_rel);
        let mode = self.mode();
        let dir_key = mode.key(dir_rel);
        let file_key = mode.key(filename);

        self.check_file_shadows_subtree(&file_rel, &dir_key, filename).await?;

        // A file processed outside a walked parent has no directory cache;
        // fetch just its own row(s) and drop the entry again afterwards.
        let provisional = !self.records_cache.contains_key(&dir_key);
        if provisional {
            let rows = self.store().fetch_one(&dir_key, &file_key).await.or_raise(|| ErrorKind::Store)?;
            let rows = if rows.len() > 1 {
                let on_disk = vec![filename.to_owned()];
                self.deduplicate_records(rows, dir_rel, &on_disk).await?
            } else {
                rows
            };
            let mut cache = HashMap::with_capacity(rows.len());
            for record in rows {
                cache.insert(mode.key(&record.filename), record);
            }
            self.records_cache.insert(dir_key.clone(), cache);
        }

        let cached = self.records_cache.get(&dir_key).and_then(|cache| cache.get(&file_key)).cloned();
        let result = self.decide(absolute, dir_rel, filename, &dir_key, &file_key, cached).await;

        if provisional {
            self.records_cache.remove(&dir_key);
        }
        result
    }

    /// The per-file insert/update/skip decision.
    async fn decide(
        &mut self,
        absolute: &Path,
        dir_rel: &str,
        filename: &str,
        dir_key: &str,
        file_key: &str,
        cached: Option<Record>,
    ) -> Result<()> {
        if cached.is_some() && !self.config().reindex_all {
            self.stats.skipped += 1;
            return Ok(());
        }
        let hash = match hash_file(absolute, self.config().hash_algo).await {
            Ok(hash) => hash,
            Err(_) => {
                self.log(Level::Error, format!("hash_file error processing {}!?", absolute.display()));
                self.stats.errors += 1;
                return Ok(());
            },
        };
        let fresh = NewRecord { dir: dir_rel.to_owned(), filename: filename.to_owned(), hash };

        match cached {
            None => {
                let inserted = self.store().insert(&fresh).await;
                match inserted {
                    Ok(fid) => {
                        self.stats.new += 1;
                        let record = Record {
                            fid,
                            dir: fresh.dir,
                            filename: fresh.filename,
                            hash: fresh.hash,
                            extra: Vec::new(),
                        };
                        if let Some(cache) = self.records_cache.get_mut(dir_key) {
                            cache.insert(file_key.to_owned(), record);
                        }
                    },
                    Err(err) => {
                        self.log(
                            Level::Error,
                            format!(
                                "Error inserting record for '{}': {}. If the database reported a uniqueness \
                                 violation, the case_insensitive_database setting likely does not match the \
                                 collation of the '{}' table.",
                                fresh.rel_path(),
                                err.current_value(),
                                self.config().table,
                            ),
                        );
                        self.stats.errors += 1;
                    },
                }
            },
            Some(cached) => {
                if records_equal(&fresh, &cached, self.config().reindex_all) {
                    self.stats.equal += 1;
                    return Ok(());
                }
                // A failed insert leaves an incomplete but consistent index.
                // A failed update means the cached view and the database
                // disagree, and every further write through that view would
                // compound the damage. Abort the call tree.
                let affected = match self.store().update(cached.fid, &fresh).await {
                    Ok(affected) => affected,
                    Err(err) => return Err(err.raise(ErrorKind::UpdateFailed(cached.fid))),
                };
                if affected != 1 {
                    exn::bail!(ErrorKind::UpdateFailed(cached.fid));
                }
                self.stats.updated += 1;
                let record = Record {
                    fid: cached.fid,
                    dir: fresh.dir,
                    filename: fresh.filename,
                    hash: fresh.hash,
                    extra: cached.extra,
                };
                if let Some(cache) = self.records_cache.get_mut(dir_key) {
                    cache.insert(file_key.to_owned(), record);
                }
            },
        }
        Ok(())
    }
}

/// Whether a freshly computed record and the cached one describe the same
/// indexed state. Hashes decide; under `reindex_all` a difference in stored
/// casing also counts as a change, which is what makes re-casing updates
/// happen.
fn records_equal(fresh: &NewRecord, cached: &Record, reindex_all: bool) -> bool {
    if fresh.hash != cached.hash {
        return false;
    }
    if reindex_all && (fresh.dir != cached.dir || fresh.filename != cached.filename) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached(dir: &str, filename: &str, hash: &str) -> Record {
        Record { fid: 1, dir: dir.into(), filename: filename.into(), hash: hash.into(), extra: Vec::new() }
    }

    fn fresh(dir: &str, filename: &str, hash: &str) -> NewRecord {
        NewRecord { dir: dir.into(), filename: filename.into(), hash: hash.into() }
    }

    #[test]
    fn test_records_equal_on_hash() {
        assert!(records_equal(&fresh("d", "f", "abc"), &cached("d", "f", "abc"), false));
        assert!(!records_equal(&fresh("d", "f", "abc"), &cached("d", "f", "def"), false));
        assert!(!records_equal(&fresh("d", "f", "abc"), &cached("d", "f", "def"), true));
    }

    #[test]
    fn test_recasing_counts_as_change_only_under_reindex() {
        // same hash, different stored casing
        assert!(records_equal(&fresh("d", "Aa", "abc"), &cached("d", "AA", "abc"), false));
        assert!(!records_equal(&fresh("d", "Aa", "abc"), &cached("d", "AA", "abc"), true));
        assert!(!records_equal(&fresh("D", "aa", "abc"), &cached("d", "aa", "abc"), true));
    }
}
