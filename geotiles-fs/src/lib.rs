//! Filesystem helpers for locating the on-disk tile database, built on
//! `cap-std` and `camino`.
#![forbid(unsafe_code)]

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use std::io;

/// Create every missing directory above `path` so a database file can be
/// opened there.
///
/// A bare file name or a file directly under the root has nothing to create.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() && parent.parent().is_some() => {
            Dir::create_ambient_dir_all(parent, ambient_authority())
        }
        _ => Ok(()),
    }
}
