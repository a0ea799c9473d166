//! The indexed-record model.

/// One row of the index table.
///
/// `dir` is the directory path relative to the allowed root (`""` for the
/// root itself, `/`-separated, never leading/trailing slashes, never `.` or
/// `..` segments) and `filename` is a bare basename. Both are stored in their
/// original casing regardless of matching mode; lowercasing only ever happens
/// to *keys*, never to stored values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Store-assigned stable identifier.
    pub fid: i64,
    pub dir: String,
    pub filename: String,
    /// Lowercase hex digest from the first configured cache field.
    pub hash: String,
    /// Values of any further configured cache fields, fetched for callers
    /// but never written by the engine.
    pub extra: Vec<(String, Option<String>)>,
}

impl Record {
    /// The record's path relative to the allowed root.
    pub fn rel_path(&self) -> String {
        join_rel(&self.dir, &self.filename)
    }
}

/// A record as computed from the live filesystem, before the store has
/// assigned it a `fid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub dir: String,
    pub filename: String,
    pub hash: String,
}

impl NewRecord {
    pub fn rel_path(&self) -> String {
        join_rel(&self.dir, &self.filename)
    }
}

/// Join a relative directory and a basename; the root directory is `""`.
pub fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() { name.to_owned() } else { format!("{dir}/{name}") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rel_path() {
        let record = Record {
            fid: 7,
            dir: "aa/bb/cc".into(),
            filename: "AA".into(),
            hash: "c22b5f9178342609428d6f51b2c5af4c0bde6a42".into(),
            extra: Vec::new(),
        };
        assert_eq!(record.rel_path(), "aa/bb/cc/AA");
    }

    #[test]
    fn test_rel_path_in_root() {
        assert_eq!(join_rel("", "AA"), "AA");
        assert_eq!(join_rel("d", "bb"), "d/bb");
    }
}
