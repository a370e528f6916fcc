//! Diffing two sure streams against each other.
//!
//! Both streams are walked in lockstep, directory by directory, in the
//! lexicographic order the wire grammar guarantees. A name present on
//! only one side is an add or a delete; a name present on both is
//! compared attribute by attribute, and any attribute whose value
//! differs between the two (other than the ones in `ignore`) is
//! reported against the path.

use crate::errors::{Error, Result};
use crate::node::Event;
use log::error;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

/// Attributes that are expected to change across a restore or a clock
/// skew and aren't worth reporting as a real difference.
const ALWAYS_IGNORED: &[&str] = &["ctime", "ino"];

/// Compare `old` against `new`, writing a human-readable diff to `out`.
/// `ignore` is an additional set of attribute names to leave out of the
/// comparison, on top of `ctime`/`ino`, which are always ignored.
pub fn compare_trees<W, IA, IB>(
    out: &mut W,
    old: IA,
    new: IB,
    ignore: &[&str],
) -> Result<()>
where
    W: Write,
    IA: Iterator<Item = Result<Event>>,
    IB: Iterator<Item = Result<Event>>,
{
    let mut ignore: HashSet<String> = ignore.iter().map(|s| (*s).to_string()).collect();
    for att in ALWAYS_IGNORED {
        ignore.insert((*att).to_string());
    }

    let mut state = State {
        out,
        old,
        new,
        left: Event::Mark,
        right: Event::Mark,
        adds: HashSet::new(),
        missings: HashSet::new(),
        ignore,
    };

    state.advance_old()?;
    state.advance_new()?;
    state.walk_root(Path::new("."))
}

struct State<'w, W, IA, IB> {
    out: &'w mut W,
    old: IA,
    new: IB,
    left: Event,
    right: Event,
    adds: HashSet<String>,
    missings: HashSet<String>,
    ignore: HashSet<String>,
}

impl<'w, W, IA, IB> State<'w, W, IA, IB>
where
    W: Write,
    IA: Iterator<Item = Result<Event>>,
    IB: Iterator<Item = Result<Event>>,
{
    /// Advance the old stream. A stream that runs dry mid-comparison
    /// means the other side is malformed (more nesting than it closed);
    /// treat it as a `Leave` so the walk terminates instead of panicking.
    fn advance_old(&mut self) -> Result<()> {
        self.left = match self.old.next() {
            None => Event::Leave,
            Some(r) => r?,
        };
        Ok(())
    }

    fn advance_new(&mut self) -> Result<()> {
        self.right = match self.new.next() {
            None => Event::Leave,
            Some(r) => r?,
        };
        Ok(())
    }

    fn walk_root(&mut self, dir: &Path) -> Result<()> {
        if !self.left.is_enter() {
            return Err(Error::parse("old stream does not start with an Enter"));
        }
        if !self.right.is_enter() {
            return Err(Error::parse("new stream does not start with an Enter"));
        }
        if self.left.name() != "__root__" || self.right.name() != "__root__" {
            return Err(Error::parse("stream's first event is not the root"));
        }

        self.compare_atts(dir)?;
        self.advance_old()?;
        self.advance_new()?;
        self.walk_samedir(dir)
    }

    /// Both sides are positioned within the same directory, at the start
    /// of its subdirectory run. Compares subdirectories, then falls
    /// through to the plain-entry run.
    fn walk_samedir(&mut self, dir: &Path) -> Result<()> {
        loop {
            match (self.left.is_mark(), self.right.is_mark()) {
                (true, true) => {
                    self.advance_old()?;
                    self.advance_new()?;
                    return self.walk_samefiles(dir);
                }
                (false, true) => {
                    self.show_delete(dir)?;
                    self.advance_old()?;
                    self.skip_old_subtree()?;
                }
                (true, false) => {
                    self.show_add(dir)?;
                    self.advance_new()?;
                    self.skip_new_subtree()?;
                }
                _ if self.left.name() < self.right.name() => {
                    self.show_delete(dir)?;
                    self.advance_old()?;
                    self.skip_old_subtree()?;
                }
                _ if self.left.name() > self.right.name() => {
                    self.show_add(dir)?;
                    self.advance_new()?;
                    self.skip_new_subtree()?;
                }
                _ => {
                    let subdir = dir.join(self.left.name());
                    self.compare_atts(&subdir)?;
                    self.advance_old()?;
                    self.advance_new()?;
                    self.walk_samedir(&subdir)?;
                }
            }
        }
    }

    /// Both sides are positioned within the same directory's plain-entry
    /// run. Compares entries until both reach `Leave`.
    fn walk_samefiles(&mut self, dir: &Path) -> Result<()> {
        loop {
            match (self.left.is_leave(), self.right.is_leave()) {
                (true, true) => {
                    self.advance_old()?;
                    self.advance_new()?;
                    return Ok(());
                }
                (false, true) => {
                    self.show_delete(dir)?;
                    self.advance_old()?;
                }
                (true, false) => {
                    self.show_add(dir)?;
                    self.advance_new()?;
                }
                _ if self.left.name() < self.right.name() => {
                    self.show_delete(dir)?;
                    self.advance_old()?;
                }
                _ if self.left.name() > self.right.name() => {
                    self.show_add(dir)?;
                    self.advance_new()?;
                }
                _ => {
                    let path = dir.join(self.left.name());
                    self.compare_atts(&path)?;
                    self.advance_old()?;
                    self.advance_new()?;
                }
            }
        }
    }

    /// Consume an entire subtree on the old side (its matching `Leave`
    /// included) because it doesn't correspond to anything on the new
    /// side.
    fn skip_old_subtree(&mut self) -> Result<()> {
        loop {
            if self.left.is_enter() {
                self.advance_old()?;
                self.skip_old_subtree()?;
            } else if self.left.is_leave() {
                self.advance_old()?;
                return Ok(());
            } else {
                self.advance_old()?;
            }
        }
    }

    fn skip_new_subtree(&mut self) -> Result<()> {
        loop {
            if self.right.is_enter() {
                self.advance_new()?;
                self.skip_new_subtree()?;
            } else if self.right.is_leave() {
                self.advance_new()?;
                return Ok(());
            } else {
                self.advance_new()?;
            }
        }
    }

    fn show_add(&mut self, dir: &Path) -> Result<()> {
        writeln!(
            self.out,
            "+ {} {}",
            self.right.kind(),
            dir.join(self.right.name()).display()
        )
        .map_err(|e| Error::io("write", "<diff output>", e))
    }

    fn show_delete(&mut self, dir: &Path) -> Result<()> {
        writeln!(
            self.out,
            "- {} {}",
            self.left.kind(),
            dir.join(self.left.name()).display()
        )
        .map_err(|e| Error::io("write", "<diff output>", e))
    }

    /// Compare the attribute maps of two matching `Enter` or `Node`
    /// events and report any differences found at `path`.
    fn compare_atts(&mut self, path: &Path) -> Result<()> {
        let mut old = self.left.atts().expect("enter/node carries atts").clone();
        let new = self.right.atts().expect("enter/node carries atts").clone();

        for att in &self.ignore {
            old.remove(att);
        }

        let mut diffs: Vec<String> = Vec::new();
        for (k, v) in &new {
            if self.ignore.contains(k) {
                continue;
            }
            match old.get(k) {
                None => {
                    if self.adds.insert(k.clone()) {
                        error!("Extra attribute: {}", k);
                    }
                }
                Some(ov) => {
                    if v != ov {
                        diffs.push(k.clone());
                    }
                }
            }
            old.remove(k);
        }

        for k in old.keys() {
            if self.missings.insert(k.clone()) {
                error!("Missing attribute: {}", k);
            }
        }

        if !diffs.is_empty() {
            diffs.sort();
            writeln!(
                self.out,
                "  [{:<20}] {}",
                diffs.join(","),
                path.display()
            )
            .map_err(|e| Error::io("write", "<diff output>", e))?;
        }

        Ok(())
    }
}
