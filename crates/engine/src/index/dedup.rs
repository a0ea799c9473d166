//! Resolution of case-collision duplicates.

use exn::ResultExt;
use findex_store::Record;
use std::collections::HashMap;

use crate::error::{ErrorKind, Result};
use crate::index::walk::Walk;
use crate::logger::Level;

impl Walk<'_> {
    /// Collapse rows that describe the same on-disk file under different
    /// casings down to one row each.
    ///
    /// Happens when a case-sensitive database sits under a case-insensitive
    /// filesystem: nothing stops `("d", "bb")`, `("d", "bB")` and
    /// `("D", "BB")` from coexisting even though only one file can. The
    /// rows are grouped by lowercased filename; within a group the row
    /// whose `(dir, filename)` exactly matches the on-disk casing wins
    /// (first fetched row when none does), and every loser is deleted
    /// *unconditionally* - surviving duplicates would poison every later
    /// equality check, so `remove_nonexistent_from_index` does not apply
    /// here.
    ///
    /// `dir_rel` and `on_disk` describe the live directory the rows were
    /// fetched for; fetch order is the store's `(dir, filename)` ordering,
    /// which keeps the emitted warnings deterministic.
    pub(crate) async fn deduplicate_records(
        &self,
        records: Vec<Record>,
        dir_rel: &str,
        on_disk: &[String],
    ) -> Result<Vec<Record>> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
        for record in records {
            let key = record.filename.to_lowercase();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(record);
        }

        let mut kept = Vec::with_capacity(order.len());
        for key in order {
            let mut group = groups.remove(&key).unwrap_or_default();
            let winner = group
                .iter()
                .position(|record| {
                    record.dir == dir_rel && on_disk.iter().any(|name| name == &record.filename)
                })
                .unwrap_or(0);
            let winner_path = group[winner].rel_path();
            for (index, record) in group.iter().enumerate() {
                if index == winner {
                    continue;
                }
                self.store().delete_by_fid(record.fid).await.or_raise(|| ErrorKind::Store)?;
                self.log(
                    Level::Warning,
                    format!(
                        "Removed record for '{}' because another record for '{winner_path}' exists. These \
                         records are duplicate because the file system is apparently case insensitive.",
                        record.rel_path(),
                    ),
                );
            }
            kept.push(group.swap_remove(winner));
        }
        Ok(kept)
    }
}
