//! A filesystem integrity checker: walk a directory tree, record cheap
//! and expensive attributes of every entry, and later compare or update
//! that record against the live tree.
//!
//! The moving parts are a [`node`] event model (the `ENTER MARK NODE
//! LEAVE` stream that linearizes a tree), a live-filesystem
//! [`node::fs`] walker, a gzip-framed on-disk [`store`], an attribute
//! [`compare`], and an [`update`] merge that hoists content hashes
//! forward when a file's identity proves it unchanged.

pub mod compare;
pub mod dirlist;
pub mod errors;
pub mod escape;
pub mod hashes;
pub mod node;
pub mod progress;
pub mod store;
pub mod update;

pub use errors::{Error, Result};
pub use hashes::Estimate;
pub use node::Event;
pub use progress::log_init;
pub use store::Surefile;

use log::info;
use std::io::Write;
use std::path::Path;

/// Walk `dir` and write a fresh surefile at `sure`, with no hash
/// hoisting. Used by the `scan` subcommand.
pub fn scan<P: AsRef<Path>>(dir: P, sure: &Surefile) -> Result<()> {
    let dir = dir.as_ref();
    announce("scan", dir);
    let events = node::fs::scan(dir)?;
    let estimate = events.estimate();
    let tracked = node::fullpath::into_tracker(events, &dir.display().to_string())?;
    let hashed = hashes::fill_hashes(tracked, estimate);
    sure.save(hashed)
}

/// Walk `dir`, hoisting hashes from the previous surefile wherever
/// inode and ctime prove a file unchanged, and write the result as the
/// new surefile. Used by the `update` subcommand.
pub fn update<P: AsRef<Path>>(dir: P, sure: &Surefile) -> Result<()> {
    let dir = dir.as_ref();
    announce("update", dir);
    let old = sure.load()?;
    let new = node::fs::scan(dir)?;
    let estimate = new.estimate();

    let merged = update::combine(old, new)?;
    let tracked = node::fullpath::into_tracker(merged, &dir.display().to_string())?;
    let hashed = hashes::fill_hashes(tracked, estimate);
    sure.save(hashed)
}

/// Walk `dir` and compare it against the current surefile, writing a
/// textual diff to `out`. Used by the `check` subcommand.
///
/// The live tree is fully hashed before comparing (the same as `scan`
/// would do), since the walker's `Node`s carry no `sha1` on their own —
/// otherwise a content change would only show up as the `mtime` it
/// happens to carry, or not at all if `mtime` was preserved.
pub fn check<P: AsRef<Path>, W: Write>(dir: P, sure: &Surefile, out: &mut W) -> Result<()> {
    let dir = dir.as_ref();
    announce("check", dir);
    let old = sure.load()?;
    let events = node::fs::scan(dir)?;
    let estimate = events.estimate();
    let tracked = node::fullpath::into_tracker(events, &dir.display().to_string())?;
    let new = hashes::fill_hashes(tracked, estimate);
    compare::compare_trees(out, old, new, &[])
}

/// Compare the prior surefile against the current one, with no live
/// filesystem walk. Used by the `signoff` subcommand to review what an
/// `update` changed.
pub fn signoff<W: Write>(sure: &Surefile, out: &mut W) -> Result<()> {
    let old = sure.load_prior()?;
    let new = sure.load()?;
    compare::compare_trees(out, old, new, &[])
}

/// Read the current surefile and print a textual event dump to `out`.
/// Used by the `show` subcommand.
pub fn show<W: Write>(sure: &Surefile, out: &mut W) -> Result<()> {
    for event in sure.load()? {
        writeln!(out, "{:?}", event?).map_err(|e| Error::io("write", "<show output>", e))?;
    }
    Ok(())
}

/// Walk `dir` and print a textual event dump to `out`, without touching
/// any surefile. Used by the `walk` subcommand.
pub fn walk<P: AsRef<Path>, W: Write>(dir: P, out: &mut W) -> Result<()> {
    for event in node::fs::scan(dir)? {
        writeln!(out, "{:?}", event?).map_err(|e| Error::io("write", "<walk output>", e))?;
    }
    Ok(())
}

/// Log a one-line summary of what a subcommand is about to do, at info
/// level, in the spirit of the ambient logging every operation here
/// carries.
pub(crate) fn announce(op: &str, dir: &Path) {
    info!("{} {}", op, dir.display());
}
