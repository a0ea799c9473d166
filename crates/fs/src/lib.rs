//! Filesystem collaborators for the findex index.
//!
//! Everything here is deliberately thin: path validation and containment,
//! raw directory listing, and content hashing. The decisions about what the
//! results *mean* (which entries to skip, what a missing name implies for
//! the index) belong to the engine crate.

pub mod error;
mod hash;
mod path;
mod walk;

pub use crate::hash::{HashAlgo, hash_file};
pub use crate::path::{relative_to_root, split_rel, validate_target};
pub use crate::walk::{DirEntry, EntryKind, list_dir};
