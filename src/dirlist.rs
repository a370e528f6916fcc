//! The DirLister: enumerate a directory's entries as (name, inode) pairs,
//! ordered the way the subsequent `lstat` pass wants them.

use crate::errors::{IoContext, Result};
use std::fs;
use std::os::unix::fs::DirEntryExt;
use std::path::Path;

/// One raw directory entry, before any `lstat` has been performed on it.
pub struct Listing {
    pub name: String,
    pub ino: u64,
}

/// List `path`'s entries, skipping `.`, `..`, and the surefile family
/// (anything starting with `0sure.` or `2sure.`, regardless of what base
/// name this particular run is configured to use — the reference
/// implementation hardcodes both historical prefixes), sorted ascending
/// by inode number.
///
/// Sorting by inode is a performance heuristic on spinning media: the
/// `lstat` this feeds is latency-sensitive, and visiting inodes in
/// ascending order tends to track on-disk locality.
pub fn list(path: &Path) -> Result<Vec<Listing>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(path).ctx("opendir", path)? {
        let entry = entry.ctx("readdir", path)?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue, // Non-UTF-8 names can't be escaped as a `String`; handled upstream via OsStr where needed.
        };

        if is_surefile_artifact(&name) {
            continue;
        }

        entries.push(Listing { name, ino: entry.ino() });
    }

    entries.sort_by_key(|e| e.ino);
    Ok(entries)
}

fn is_surefile_artifact(name: &str) -> bool {
    name.starts_with("0sure.") || name.starts_with("2sure.")
}
