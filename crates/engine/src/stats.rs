//! Walk statistics.

use crate::logger::{Level, Logger};

/// Counters accumulated over one `process_paths` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Files indexed for the first time.
    pub new: u64,
    /// Files whose record was rewritten (hash change or re-casing).
    pub updated: u64,
    /// Files rehashed under `reindex_all` and found unchanged.
    pub equal: u64,
    /// Files skipped because a record already existed.
    pub skipped: u64,
    pub symlinks_skipped: u64,
    /// Failures that were logged and walked past.
    pub errors: u64,
}

impl Stats {
    /// Emit the end-of-call summary. Lines appear in a fixed order and only
    /// when their counter is non-zero; errors get a warning, the rest info.
    pub(crate) fn report(&self, logger: &dyn Logger) {
        if self.new > 0 {
            logger.log(Level::Info, format!("Added {} new file(s).", self.new));
        }
        if self.updated > 0 {
            logger.log(Level::Info, format!("Updated {} file(s).", self.updated));
        }
        if self.equal > 0 {
            logger.log(Level::Info, format!("Reindexed {} file(s) which were already indexed and equal.", self.equal));
        }
        if self.skipped > 0 {
            logger.log(Level::Info, format!("Skipped {} already indexed file(s).", self.skipped));
        }
        if self.symlinks_skipped > 0 {
            logger.log(Level::Info, format!("Skipped {} symlink(s).", self.symlinks_skipped));
        }
        if self.errors > 0 {
            logger.log(Level::Warning, format!("Encountered {} indexing error(s).", self.errors));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MemoryLogger;

    #[test]
    fn test_report_emits_only_nonzero_counters_in_order() {
        let logger = MemoryLogger::new();
        let stats = Stats { new: 4, updated: 0, equal: 0, skipped: 2, symlinks_skipped: 1, errors: 1 };
        stats.report(&logger);
        let entries = logger.entries();
        assert_eq!(
            entries,
            vec![
                (Level::Info, "Added 4 new file(s).".to_owned()),
                (Level::Info, "Skipped 2 already indexed file(s).".to_owned()),
                (Level::Info, "Skipped 1 symlink(s).".to_owned()),
                (Level::Warning, "Encountered 1 indexing error(s).".to_owned()),
            ],
        );
    }

    #[test]
    fn test_report_of_empty_stats_is_silent() {
        let logger = MemoryLogger::new();
        Stats::default().report(&logger);
        assert!(logger.entries().is_empty());
    }
}
