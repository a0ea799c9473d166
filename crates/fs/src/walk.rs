//! Directory listing.

use std::path::Path;

use crate::error::{ErrorKind, Result};

/// One directory entry as the walker sees it.
///
/// `kind` is taken from the entry itself (symlinks are *not* followed), so a
/// symlink pointing at a directory is still [`EntryKind::Symlink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// List the entries of a directory, excluding `.` and `..`.
///
/// Entries come back in readdir order unless `sorted` is set, in which case
/// they are sorted bytewise by name. Names that aren't valid UTF-8 cannot be
/// stored in the index and are skipped with a diagnostic.
pub async fn list_dir(path: &Path, sorted: bool) -> Result<Vec<DirEntry>> {
    let mut reader = tokio::fs::read_dir(path).await.map_err(ErrorKind::Io)?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(ErrorKind::Io)? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!(path = %entry.path().display(), "skipping directory entry with non-UTF8 name");
            continue;
        };
        let file_type = entry.file_type().await.map_err(ErrorKind::Io)?;
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        entries.push(DirEntry { name, kind });
    }
    if sorted {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_dir_sorted() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("bb"), b"").await.unwrap();
        tokio::fs::write(dir.path().join("AA"), b"").await.unwrap();
        tokio::fs::create_dir(dir.path().join("aa")).await.unwrap();
        let entries = list_dir(dir.path(), true).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["AA", "aa", "bb"]);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[1].kind, EntryKind::Directory);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_list_dir_reports_symlinks_as_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(dir.path().join("real")).await.unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        let entries = list_dir(dir.path(), true).await.unwrap();
        let link = entries.iter().find(|e| e.name == "link").unwrap();
        // a symlink to a directory is still a symlink to the walker
        assert_eq!(link.kind, EntryKind::Symlink);
    }

    #[tokio::test]
    async fn test_list_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_dir(&dir.path().join("ghost"), false).await.is_err());
    }
}
