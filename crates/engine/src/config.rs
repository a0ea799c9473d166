//! Engine configuration.

use findex_fs::HashAlgo;
use findex_store::MatchingMode;
use std::path::PathBuf;

use crate::error::{ErrorKind, Result};

/// Immutable configuration for an [`Indexer`](crate::Indexer).
///
/// Built with [`new`](Self::new) plus `with_*` setters and validated when the
/// indexer is constructed; nothing reads it after that point except the
/// engine itself.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Root of the indexed tree; nothing above it is ever touched.
    pub allowed_base_directory: PathBuf,
    /// Base for resolving relative input paths; the process working
    /// directory when unset.
    pub base_directory: Option<PathBuf>,
    /// Name of the index table.
    pub table: String,
    /// Columns fetched/written besides `fid`/`dir`/`filename`; the first one
    /// is the hash column.
    pub cache_fields: Vec<String>,
    /// Content hash algorithm (independent of the hash column's name).
    pub hash_algo: HashAlgo,
    pub case_insensitive_database: bool,
    pub case_insensitive_filesystem: bool,
    /// Rehash and compare every file even when a record already exists.
    pub reindex_all: bool,
    /// Let the consistency checks delete instead of only warning.
    pub remove_nonexistent_from_index: bool,
    /// Index symlinks (under their own name) instead of skipping them.
    pub process_symlinks: bool,
    /// Sort directory listings instead of taking readdir order.
    pub sort_directory_entries: bool,
}

impl IndexerConfig {
    pub fn new(allowed_base_directory: impl Into<PathBuf>) -> Self {
        Self {
            allowed_base_directory: allowed_base_directory.into(),
            base_directory: None,
            table: "file".to_owned(),
            cache_fields: vec!["sha256".to_owned()],
            hash_algo: HashAlgo::Sha256,
            case_insensitive_database: true,
            case_insensitive_filesystem: false,
            reindex_all: false,
            remove_nonexistent_from_index: false,
            process_symlinks: false,
            sort_directory_entries: false,
        }
    }

    pub fn with_base_directory(mut self, base: impl Into<PathBuf>) -> Self {
        self.base_directory = Some(base.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_cache_fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cache_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_hash_algo(mut self, algo: HashAlgo) -> Self {
        self.hash_algo = algo;
        self
    }

    pub fn with_case_insensitive_database(mut self, insensitive: bool) -> Self {
        self.case_insensitive_database = insensitive;
        self
    }

    pub fn with_case_insensitive_filesystem(mut self, insensitive: bool) -> Self {
        self.case_insensitive_filesystem = insensitive;
        self
    }

    pub fn with_reindex_all(mut self, reindex: bool) -> Self {
        self.reindex_all = reindex;
        self
    }

    pub fn with_remove_nonexistent_from_index(mut self, remove: bool) -> Self {
        self.remove_nonexistent_from_index = remove;
        self
    }

    pub fn with_process_symlinks(mut self, process: bool) -> Self {
        self.process_symlinks = process;
        self
    }

    pub fn with_sort_directory_entries(mut self, sort: bool) -> Self {
        self.sort_directory_entries = sort;
        self
    }

    /// The matching mode implied by the two case-sensitivity flags.
    pub fn mode(&self) -> MatchingMode {
        MatchingMode::new(self.case_insensitive_filesystem, self.case_insensitive_database)
    }

    /// Name of the hash column.
    pub fn hash_field(&self) -> &str {
        self.cache_fields.first().map(String::as_str).unwrap_or_default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.allowed_base_directory.is_absolute() {
            exn::bail!(ErrorKind::InvalidConfig("allowed_base_directory must be absolute"));
        }
        if let Some(base) = &self.base_directory
            && !base.is_absolute()
        {
            exn::bail!(ErrorKind::InvalidConfig("base_directory must be absolute"));
        }
        if self.cache_fields.is_empty() {
            exn::bail!(ErrorKind::InvalidConfig("cache_fields must contain at least the hash column"));
        }
        if self.table.is_empty() {
            exn::bail!(ErrorKind::InvalidConfig("table must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexerConfig::new("/library");
        assert_eq!(config.table, "file");
        assert_eq!(config.cache_fields, vec!["sha256".to_owned()]);
        assert_eq!(config.hash_field(), "sha256");
        assert_eq!(config.hash_algo, HashAlgo::Sha256);
        assert!(config.case_insensitive_database);
        assert!(!config.case_insensitive_filesystem);
        assert_eq!(config.mode(), MatchingMode::InsensitiveDb);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(IndexerConfig::new("relative/root").validate().is_err());
        assert!(IndexerConfig::new("/library").with_base_directory("relative").validate().is_err());
        let empty_fields = IndexerConfig::new("/library").with_cache_fields(Vec::<String>::new());
        assert!(empty_fields.validate().is_err());
        assert!(IndexerConfig::new("/library").with_table("").validate().is_err());
    }

    #[test]
    fn test_mode_follows_flags() {
        let config = IndexerConfig::new("/library")
            .with_case_insensitive_database(false)
            .with_case_insensitive_filesystem(true);
        assert_eq!(config.mode(), MatchingMode::InsensitiveFs);
    }
}
