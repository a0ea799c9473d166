//! The four consistency checks.
//!
//! Shared policy: warn at detection; when `remove_nonexistent_from_index`
//! is set, additionally delete the offending rows and log an info line with
//! the deletion count. Name lists in the warnings are sorted so the output
//! is deterministic regardless of map iteration order.

use exn::ResultExt;
use findex_store::join_rel;
use findex_fs::split_rel;
use std::collections::{BTreeMap, HashSet};

use crate::error::{ErrorKind, Result};
use crate::index::walk::Walk;
use crate::logger::Level;

impl Walk<'_> {
    /// Records exist for files that are no longer in this directory.
    ///
    /// Runs while a directory's caches are being populated. The diff is
    /// taken on matching keys, so a pure re-casing on disk does not count
    /// as a missing file unless both sides are case-sensitive.
    pub(crate) async fn check_missing_files(
        &mut self,
        dir_rel: &str,
        dir_key: &str,
        on_disk: &[String],
    ) -> Result<()> {
        let mode = self.mode();
        let disk_keys: HashSet<String> = on_disk.iter().map(|name| mode.key(name)).collect();
        let mut missing: Vec<String> = self
            .records_cache
            .get(dir_key)
            .map(|cache| {
                cache
                    .iter()
                    .filter(|(key, _)| !disk_keys.contains(*key))
                    .map(|(_, record)| record.filename.clone())
                    .collect()
            })
            .unwrap_or_default();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        let list = missing.join(", ");
        self.log(
            Level::Warning,
            format!("Indexed records exist for the following nonexistent files in directory '{dir_rel}': {list}."),
        );
        if !self.config().remove_nonexistent_from_index {
            return Ok(());
        }
        let affected =
            self.store().delete_files_in_dir(dir_key, &missing).await.or_raise(|| ErrorKind::Store)?;
        self.log(
            Level::Info,
            format!("Removed {affected} indexed record(s) for nonexistent files in directory '{dir_rel}': {list}."),
        );
        if let Some(cache) = self.records_cache.get_mut(dir_key) {
            cache.retain(|key, _| disk_keys.contains(key));
        }
        Ok(())
    }

    /// Records exist below subdirectories that are gone from disk.
    ///
    /// When matching is case-insensitive, several cached casings of one
    /// name collapse into a single subtree delete; the removal line then
    /// carries the lexicographically smallest casing. The warning always
    /// lists every casing present so a case-sensitive database's state
    /// stays visible in the log.
    pub(crate) async fn check_missing_subdirs(
        &mut self,
        dir_rel: &str,
        dir_key: &str,
        on_disk: &[String],
    ) -> Result<()> {
        let mode = self.mode();
        let disk_keys: HashSet<String> = on_disk.iter().map(|name| mode.key(name)).collect();
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(cached) = self.subdirs_cache.get(dir_key) {
            for name in cached {
                let key = mode.key(name);
                if !disk_keys.contains(&key) {
                    groups.entry(key).or_default().push(name.clone());
                }
            }
        }
        if groups.is_empty() {
            return Ok(());
        }
        let mut all_names: Vec<String> = groups.values().flatten().cloned().collect();
        all_names.sort();
        all_names.dedup();
        self.log(
            Level::Warning,
            format!(
                "Indexed records exist for files in the following nonexistent subdirectories of directory \
                 '{dir_rel}': {}.",
                all_names.join(", "),
            ),
        );
        if !self.config().remove_nonexistent_from_index {
            return Ok(());
        }
        for (_, mut casings) in groups {
            casings.sort();
            // one delete covers every casing of this name; log the smallest
            let target = join_rel(dir_rel, &casings[0]);
            let affected = self.store().delete_subtree(&target).await.or_raise(|| ErrorKind::Store)?;
            self.log(
                Level::Info,
                format!(
                    "Removed {affected} indexed record(s) for file(s) in (subdirectories of) nonexistent \
                     directory '{target}'.",
                ),
            );
        }
        if let Some(cached) = self.subdirs_cache.get_mut(dir_key) {
            cached.retain(|name| disk_keys.contains(&mode.key(name)));
        }
        Ok(())
    }

    /// Records exist below a path that is now a regular file.
    ///
    /// Runs from the file processor, against the parent's subdirectory
    /// cache - so it is a no-op for a file processed outside a walked
    /// parent.
    pub(crate) async fn check_file_shadows_subtree(
        &mut self,
        file_rel: &str,
        dir_key: &str,
        filename: &str,
    ) -> Result<()> {
        let mode = self.mode();
        let file_key = mode.key(filename);
        let shadowed = self
            .subdirs_cache
            .get(dir_key)
            .is_some_and(|subdirs| subdirs.iter().any(|name| mode.key(name) == file_key));
        if !shadowed {
            return Ok(());
        }
        self.log(
            Level::Warning,
            format!("Indexed records exist with '{file_rel}' (which is a file) as nonexistent base directory."),
        );
        if !self.config().remove_nonexistent_from_index {
            return Ok(());
        }
        let affected = self.store().delete_subtree(file_rel).await.or_raise(|| ErrorKind::Store)?;
        self.log(
            Level::Info,
            format!(
                "Removed {affected} indexed record(s) with '{file_rel}' (which is a file) as nonexistent base \
                 directory.",
            ),
        );
        if let Some(subdirs) = self.subdirs_cache.get_mut(dir_key) {
            subdirs.retain(|name| mode.key(name) != file_key);
        }
        Ok(())
    }

    /// An indexed record's name is now a directory.
    ///
    /// Runs at the top of the directory processor, against the parent's
    /// records cache - a no-op when the parent isn't being walked. The
    /// logged casing is the record's, which may differ from the directory's
    /// actual casing on disk.
    pub(crate) async fn check_record_shadows_directory(&mut self, dir_rel: &str) -> Result<()> {
        if dir_rel.is_empty() {
            return Ok(());
        }
        let (parent_rel, name) = split_rel(dir_rel);
        let mode = self.mode();
        let parent_key = mode.key(parent_rel);
        let name_key = mode.key(name);
        let Some(record) = self.records_cache.get(&parent_key).and_then(|cache| cache.get(&name_key)).cloned()
        else {
            return Ok(());
        };
        let file_rel = record.rel_path();
        self.log(
            Level::Warning,
            format!("Indexed record exists for file '{file_rel}', which actually matches a directory."),
        );
        if !self.config().remove_nonexistent_from_index {
            return Ok(());
        }
        let affected = self.store().delete_by_fid(record.fid).await.or_raise(|| ErrorKind::Store)?;
        if affected != 1 {
            self.log(
                Level::Warning,
                format!("Received strange value {affected} while trying to remove indexed record for file '{file_rel}'."),
            );
        }
        self.log(
            Level::Info,
            format!("Removed indexed record for file '{file_rel}' which actually matches a directory."),
        );
        if let Some(cache) = self.records_cache.get_mut(&parent_key) {
            cache.remove(&name_key);
        }
        Ok(())
    }
}
