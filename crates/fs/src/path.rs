//! Path validation and containment.
//!
//! User-supplied paths come in relative or absolute, with stray trailing
//! slashes, `.`/`..` segments and symlinked parents. Everything the engine
//! touches goes through [`validate_target`] first, which resolves all of
//! that to a canonical absolute path and refuses anything outside the
//! allowed root.

use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a user-supplied path and resolves it to canonical absolute form.
///
/// - A path starting with `/` is absolute; anything else is resolved against
///   `base` (or the process working directory when `base` is `None`).
/// - A trailing `/` is stripped, but stripping it off something that exists
///   and is not a directory fails with
///   [`NotADirectory`](ErrorKind::NotADirectory).
/// - The *parent* is canonicalized while the basename is kept as given, so a
///   symlink is indexed under its own name rather than its target's.
/// - The result must be equal to or strictly below `root` (which the caller
///   must already have canonicalized), otherwise
///   [`NotInAllowedBase`](ErrorKind::NotInAllowedBase).
/// - When `check_existence` is set the resolved path itself must exist
///   (symlinks count, even dangling ones); otherwise only the parent must
///   exist and be a directory.
pub async fn validate_target(
    input: &str,
    base: Option<&Path>,
    root: &Path,
    check_existence: bool,
) -> Result<PathBuf> {
    if input.is_empty() {
        exn::bail!(ErrorKind::InvalidPath(PathBuf::new()));
    }
    let raw = Path::new(input);
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        let base = match base {
            Some(base) => base.to_path_buf(),
            None => std::env::current_dir().map_err(ErrorKind::Io)?,
        };
        base.join(raw)
    };
    let had_trailing_slash = input.len() > 1 && input.ends_with('/');

    // Canonicalize the parent only: the basename may be a symlink whose own
    // name is what gets indexed. Paths ending in `..` (or the root itself)
    // have no basename to preserve and are canonicalized whole.
    let resolved = match joined.file_name() {
        Some(name) => {
            let parent = joined.parent().unwrap_or_else(|| Path::new("/"));
            let parent = tokio::fs::canonicalize(parent)
                .await
                .map_err(|_| ErrorKind::NotFound(joined.clone()))?;
            if !tokio::fs::metadata(&parent).await.map_err(ErrorKind::Io)?.is_dir() {
                exn::bail!(ErrorKind::NotADirectory(parent));
            }
            parent.join(name)
        },
        None => tokio::fs::canonicalize(&joined)
            .await
            .map_err(|_| ErrorKind::NotFound(joined.clone()))?,
    };

    // Judged through the symlink: a trailing slash on a link to a directory
    // is as legitimate as on the directory itself.
    if had_trailing_slash
        && let Ok(meta) = tokio::fs::metadata(&resolved).await
        && !meta.is_dir()
    {
        exn::bail!(ErrorKind::NotADirectory(resolved));
    }
    if resolved != root && !resolved.starts_with(root) {
        exn::bail!(ErrorKind::NotInAllowedBase(resolved));
    }
    if check_existence && tokio::fs::symlink_metadata(&resolved).await.is_err() {
        exn::bail!(ErrorKind::NotFound(resolved));
    }
    Ok(resolved)
}

/// The path of `abs` relative to `root`, `/`-separated, `""` for the root
/// itself.
pub fn relative_to_root(abs: &Path, root: &Path) -> Result<String> {
    let relative = match abs.strip_prefix(root) {
        Ok(relative) => relative,
        Err(_) => exn::bail!(ErrorKind::NotInAllowedBase(abs.to_path_buf())),
    };
    let mut segments = Vec::new();
    for component in relative.components() {
        match component.as_os_str().to_str() {
            Some(segment) => segments.push(segment),
            None => exn::bail!(ErrorKind::InvalidPath(abs.to_path_buf())),
        }
    }
    Ok(segments.join("/"))
}

/// Split a relative path into `(dir, filename)`; files in the root get
/// `dir == ""`.
pub fn split_rel(rel: &str) -> (&str, &str) {
    match rel.rfind('/') {
        Some(idx) => (&rel[..idx], &rel[idx + 1..]),
        None => ("", rel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        // macOS tempdirs live behind a /var symlink
        let root = tokio::fs::canonicalize(dir.path()).await.unwrap();
        (dir, root)
    }

    #[tokio::test]
    async fn test_absolute_path_inside_root() {
        let (_dir, root) = canonical_tempdir().await;
        tokio::fs::create_dir(root.join("sub")).await.unwrap();
        let input = root.join("sub").display().to_string();
        let resolved = validate_target(&input, None, &root, true).await.unwrap();
        assert_eq!(resolved, root.join("sub"));
    }

    #[tokio::test]
    async fn test_relative_path_resolved_against_base() {
        let (_dir, root) = canonical_tempdir().await;
        tokio::fs::write(root.join("file.txt"), b"x").await.unwrap();
        let resolved = validate_target("file.txt", Some(&root), &root, true).await.unwrap();
        assert_eq!(resolved, root.join("file.txt"));
        let resolved = validate_target("./file.txt", Some(&root), &root, true).await.unwrap();
        assert_eq!(resolved, root.join("file.txt"));
    }

    #[tokio::test]
    async fn test_missing_path_fails_only_when_checked() {
        let (_dir, root) = canonical_tempdir().await;
        let input = root.join("ghost").display().to_string();
        assert!(matches!(
            validate_target(&input, None, &root, true).await.unwrap_err().current_value(),
            ErrorKind::NotFound(_)
        ));
        // parent exists, so without the existence check this passes
        assert!(validate_target(&input, None, &root, false).await.is_ok());
        // but a missing parent always fails
        let input = root.join("no/such/parent").display().to_string();
        assert!(validate_target(&input, None, &root, false).await.is_err());
    }

    #[tokio::test]
    async fn test_trailing_slash_on_file() {
        let (_dir, root) = canonical_tempdir().await;
        tokio::fs::write(root.join("file.txt"), b"x").await.unwrap();
        tokio::fs::create_dir(root.join("sub")).await.unwrap();
        let input = format!("{}/", root.join("file.txt").display());
        assert!(matches!(
            validate_target(&input, None, &root, true).await.unwrap_err().current_value(),
            ErrorKind::NotADirectory(_)
        ));
        let input = format!("{}/", root.join("sub").display());
        assert!(validate_target(&input, None, &root, true).await.is_ok());
    }

    #[tokio::test]
    async fn test_containment() {
        let (_dir, root) = canonical_tempdir().await;
        tokio::fs::create_dir(root.join("inner")).await.unwrap();
        let inner = root.join("inner");
        // the root itself is allowed
        assert!(validate_target(&root.display().to_string(), None, &inner, true).await.is_err());
        assert!(validate_target(&inner.display().to_string(), None, &inner, true).await.is_ok());
        // dot-dot escapes are resolved before the containment check
        let sneaky = format!("{}/../", inner.display());
        assert!(matches!(
            validate_target(&sneaky, None, &inner, true).await.unwrap_err().current_value(),
            ErrorKind::NotInAllowedBase(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_keeps_its_own_name() {
        let (_dir, root) = canonical_tempdir().await;
        tokio::fs::write(root.join("target.txt"), b"x").await.unwrap();
        std::os::unix::fs::symlink(root.join("target.txt"), root.join("link")).unwrap();
        let input = root.join("link").display().to_string();
        let resolved = validate_target(&input, None, &root, true).await.unwrap();
        assert_eq!(resolved, root.join("link"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trailing_slash_on_symlink_follows_target() {
        let (_dir, root) = canonical_tempdir().await;
        tokio::fs::create_dir(root.join("real")).await.unwrap();
        tokio::fs::write(root.join("target.txt"), b"x").await.unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("linkdir")).unwrap();
        std::os::unix::fs::symlink(root.join("target.txt"), root.join("linkfile")).unwrap();
        // a link to a directory takes a trailing slash, keeping its own name
        let input = format!("{}/", root.join("linkdir").display());
        let resolved = validate_target(&input, None, &root, true).await.unwrap();
        assert_eq!(resolved, root.join("linkdir"));
        // a link to a file does not
        let input = format!("{}/", root.join("linkfile").display());
        assert!(matches!(
            validate_target(&input, None, &root, true).await.unwrap_err().current_value(),
            ErrorKind::NotADirectory(_)
        ));
    }

    #[test]
    fn test_relative_to_root() {
        let root = Path::new("/library");
        assert_eq!(relative_to_root(Path::new("/library"), root).unwrap(), "");
        assert_eq!(relative_to_root(Path::new("/library/a/b"), root).unwrap(), "a/b");
        assert!(relative_to_root(Path::new("/elsewhere/a"), root).is_err());
    }

    #[test]
    fn test_split_rel() {
        assert_eq!(split_rel("aa/bb/cc"), ("aa/bb", "cc"));
        assert_eq!(split_rel("top"), ("", "top"));
    }
}
