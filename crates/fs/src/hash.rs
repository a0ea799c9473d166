//! File content hashing.

use sha1::Sha1;
use sha2::digest::{Digest, Output};
use sha2::{Sha256, Sha512};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::io::AsyncReadExt;

use crate::error::{ErrorKind, Result};

const READ_BUFFER: usize = 64 * 1024;

/// Supported content hash algorithms.
///
/// The algorithm is configuration (and independent of the hash *column*
/// name), so older indexes built with sha1 keep working next to new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgo {
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl FromStr for HashAlgo {
    type Err = crate::error::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => exn::bail!(ErrorKind::UnsupportedAlgo(other.to_owned())),
        }
    }
}

impl fmt::Display for HashAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        })
    }
}

/// Hash a file's contents, returning the digest as lowercase hex.
///
/// Reads in chunks so multi-gigabyte files don't get buffered whole.
pub async fn hash_file(path: &Path, algo: HashAlgo) -> Result<String> {
    match algo {
        HashAlgo::Sha1 => digest_file::<Sha1>(path).await,
        HashAlgo::Sha256 => digest_file::<Sha256>(path).await,
        HashAlgo::Sha512 => digest_file::<Sha512>(path).await,
    }
}

async fn digest_file<D>(path: &Path) -> Result<String>
where
    D: Digest,
    Output<D>: fmt::LowerHex,
{
    let mut file = tokio::fs::File::open(path).await.map_err(ErrorKind::Io)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let read = file.read(&mut buffer).await.map_err(ErrorKind::Io)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("sha1".parse::<HashAlgo>().unwrap(), HashAlgo::Sha1);
        assert_eq!("sha256".parse::<HashAlgo>().unwrap(), HashAlgo::Sha256);
        assert_eq!("sha512".parse::<HashAlgo>().unwrap(), HashAlgo::Sha512);
        assert!("md5".parse::<HashAlgo>().is_err());
        assert_eq!(HashAlgo::Sha1.to_string(), "sha1");
    }

    #[tokio::test]
    async fn test_known_digests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file");
        tokio::fs::write(&path, "hello world").await.unwrap();
        assert_eq!(
            hash_file(&path, HashAlgo::Sha256).await.unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            hash_file(&path, HashAlgo::Sha1).await.unwrap(),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        tokio::fs::write(&path, "").await.unwrap();
        assert_eq!(
            hash_file(&path, HashAlgo::Sha256).await.unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hash_file(&path, HashAlgo::Sha1).await.unwrap(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(hash_file(&dir.path().join("ghost"), HashAlgo::Sha256).await.is_err());
    }
}
