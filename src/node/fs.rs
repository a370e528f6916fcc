//! Walking a live filesystem tree and turning it into a sure stream.
//!
//! This is the `LocalWalker`: an explicit work queue rather than real
//! recursion, so stack depth stays O(1) regardless of how deep the tree
//! goes.  Directories are listed via `dirlist` (inode order, for
//! locality on spinning media), then re-sorted by name before being
//! folded into the stream, since the stream itself is required to be in
//! lexicographic order.

use crate::dirlist;
use crate::errors::{Error, IoContext, Result};
use crate::escape::Escape;
use crate::hashes::Estimate;
use crate::node::{AttMap, Event};
use crate::progress::ScanProgress;
use log::warn;
use std::collections::VecDeque;
use std::fs::{self, symlink_metadata, Metadata};
use std::io;
use std::os::unix::prelude::*;
use std::path::{Path, PathBuf};

/// Walk `root`, printing each event. Mostly useful for manual inspection.
pub fn walk<P: AsRef<Path>>(root: P) -> Result<()> {
    for event in scan(root)? {
        let event = event?;
        println!("{:?}", event);
    }
    Ok(())
}

/// Start a walk of `root`, returning an iterator of the resulting stream.
pub fn scan<P: AsRef<Path>>(root: P) -> Result<LocalWalker> {
    let root = root.as_ref().to_path_buf();
    let meta = symlink_metadata(&root).ctx("lstat", &root)?;

    if !meta.is_dir() {
        return Err(Error::usage(format!("{:?} is not a directory", root)));
    }

    let atts = encode_atts(&root, &meta)?;
    let root_dev = meta.dev();
    let mut todo = VecDeque::new();
    todo.push_back(Pending::SubDir {
        path: root.clone(),
        name: "__root__".to_string(),
        meta,
        atts,
    });

    Ok(LocalWalker {
        todo,
        root,
        root_dev,
        progress: ScanProgress::new(),
    })
}

/// Streams a filesystem tree as a sequence of `Event`s, in the
/// `ENTER (subdir)* MARK NODE* LEAVE` grammar.
pub struct LocalWalker {
    todo: VecDeque<Pending>,
    root: PathBuf,
    root_dev: u64,
    progress: ScanProgress,
}

impl LocalWalker {
    /// A cheap up-front estimate of how much hashing work this walk will
    /// require, used to size the progress meter. This performs its own
    /// independent `lstat`-only traversal of the root (no content reads,
    /// no event allocation), so it doesn't disturb the lazily-driven main
    /// stream this walker itself produces.
    pub fn estimate(&self) -> Estimate {
        let mut estimate = Estimate::default();
        estimate_dir(&self.root, self.root_dev, &mut estimate);
        estimate
    }
}

/// Recursively tally regular-file counts and byte sizes under `dir`,
/// silently skipping anything unreadable (the real walk will warn about
/// it) and never crossing the device `root_dev` was taken from.
fn estimate_dir(dir: &Path, root_dev: u64, estimate: &mut Estimate) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if name.starts_with("0sure.") || name.starts_with("2sure.") {
                continue;
            }
        }

        let meta = match symlink_metadata(entry.path()) {
            Ok(meta) => meta,
            Err(_) => continue,
        };

        if meta.is_dir() {
            if meta.dev() == root_dev {
                estimate_dir(&entry.path(), root_dev, estimate);
            }
        } else if meta.file_type().is_file() {
            estimate.files += 1;
            estimate.bytes += meta.len();
        }
    }
}

impl Iterator for LocalWalker {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Result<Event>> {
        match self.todo.pop_front()? {
            Pending::Event(ev) => Some(Ok(ev)),
            Pending::SubDir {
                path,
                name,
                atts,
                meta,
            } => {
                // Never descend across a device boundary; the entry
                // still appears in the stream, just with nothing inside.
                if meta.dev() == self.root_dev {
                    if let Err(e) = self.push_dir(&path) {
                        return Some(Err(e));
                    }
                } else {
                    self.push_empty_dir();
                }

                Some(Ok(Event::Enter { name, atts }))
            }
        }
    }
}

impl LocalWalker {
    fn push_dir(&mut self, path: &Path) -> Result<()> {
        let listing = match dirlist::list(path) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("unable to read directory {:?}: {}", path, e);
                self.push_empty_dir();
                return Ok(());
            }
        };

        let mut files: Vec<_> = listing
            .into_iter()
            .filter_map(|entry| {
                let child = path.join(&entry.name);
                match symlink_metadata(&child) {
                    Ok(meta) => match encode_atts(&child, &meta) {
                        Ok(atts) => Some(OneFile {
                            name: entry.name,
                            meta,
                            atts,
                        }),
                        Err(e) => {
                            warn!("unable to stat {:?}: {}", child, e);
                            None
                        }
                    },
                    Err(err) => {
                        warn!("unable to stat {:?}: {}", child, err);
                        None
                    }
                }
            })
            .collect();

        // Re-sort by name now, since the inode ordering we listed in is
        // only a locality hint, and the stream must be lexicographic.
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let (dirs, files): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| f.meta.is_dir());

        self.progress.update(
            dirs.len() as u64,
            files.len() as u64,
            files.iter().map(|f| f.meta.len()).sum(),
        );

        self.todo.push_front(Pending::Event(Event::Leave));

        for f in files.into_iter().rev() {
            self.todo.push_front(Pending::Event(Event::Node {
                name: f.name.into_bytes().escaped(),
                atts: f.atts,
            }));
        }

        self.todo.push_front(Pending::Event(Event::Mark));

        for d in dirs.into_iter().rev() {
            self.todo.push_front(Pending::SubDir {
                path: path.join(&d.name),
                name: d.name.into_bytes().escaped(),
                meta: d.meta,
                atts: d.atts,
            });
        }

        Ok(())
    }

    /// Push the `Mark`/`Leave` pair needed to close out a directory
    /// whose contents we're deliberately not visiting.
    fn push_empty_dir(&mut self) {
        self.todo.push_front(Pending::Event(Event::Leave));
        self.todo.push_front(Pending::Event(Event::Mark));
    }
}

struct OneFile {
    name: String,
    meta: Metadata,
    atts: AttMap,
}

/// The work queue holds either a plain event ready to emit, or a
/// directory whose contents haven't been listed yet.
enum Pending {
    Event(Event),
    SubDir {
        path: PathBuf,
        name: String,
        meta: Metadata,
        atts: AttMap,
    },
}

/// Derive a node's attribute map from an `lstat` result and, for
/// symlinks, a `readlink`. This is a pure function of `(path, meta)`
/// except for the symlink case, which makes one more syscall.
fn encode_atts(path: &Path, meta: &Metadata) -> Result<AttMap> {
    let mode = meta.mode() as libc::mode_t & libc::S_IFMT;
    let mut atts = AttMap::new();

    atts.insert("uid".to_string(), meta.uid().to_string());
    atts.insert("gid".to_string(), meta.gid().to_string());
    atts.insert(
        "perm".to_string(),
        (meta.mode() as libc::mode_t & !libc::S_IFMT).to_string(),
    );

    match mode {
        libc::S_IFDIR => {
            atts.insert("kind".to_string(), "dir".to_string());
        }
        libc::S_IFREG => {
            atts.insert("kind".to_string(), "file".to_string());
            atts.insert("ino".to_string(), meta.ino().to_string());
            atts.insert("mtime".to_string(), meta.mtime().to_string());
            atts.insert("ctime".to_string(), meta.ctime().to_string());
        }
        libc::S_IFLNK => {
            atts.insert("kind".to_string(), "lnk".to_string());
            let target = fs::read_link(path).ctx("readlink", path)?;
            atts.insert("targ".to_string(), target.as_os_str().as_bytes().escaped());
        }
        libc::S_IFIFO => {
            atts.insert("kind".to_string(), "fifo".to_string());
        }
        libc::S_IFSOCK => {
            atts.insert("kind".to_string(), "sock".to_string());
        }
        libc::S_IFCHR => {
            atts.insert("kind".to_string(), "chr".to_string());
            add_dev(&mut atts, meta);
        }
        libc::S_IFBLK => {
            atts.insert("kind".to_string(), "blk".to_string());
            add_dev(&mut atts, meta);
        }
        _ => {
            let msg = format!("unknown file type 0o{:o}", mode);
            return Err(Error::io(
                "stat",
                path,
                io::Error::new(io::ErrorKind::Other, msg),
            ));
        }
    }

    Ok(atts)
}

fn add_dev(atts: &mut AttMap, meta: &Metadata) {
    let rdev = meta.rdev();
    // Not exported by libc, but fixed by the Linux ABI.
    atts.insert("devmaj".to_string(), ((rdev >> 8) & 0xfff).to_string());
    atts.insert("devmin".to_string(), (rdev & 0xff).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::fs::symlink;
    use tempdir::TempDir;

    fn collect(root: &Path) -> Vec<Event> {
        scan(root).unwrap().map(|e| e.unwrap()).collect()
    }

    #[test]
    fn empty_tree_is_enter_mark_leave() {
        let tmp = TempDir::new("asure-fs-test").unwrap();
        let events = collect(tmp.path());
        assert_eq!(events.len(), 3);
        assert!(events[0].is_enter());
        assert_eq!(events[0].name(), "__root__");
        assert!(events[1].is_mark());
        assert!(events[2].is_leave());
    }

    #[test]
    fn single_file_emits_node_with_hash_pending() {
        let tmp = TempDir::new("asure-fs-test").unwrap();
        File::create(tmp.path().join("a")).unwrap();

        let events = collect(tmp.path());
        let node = events
            .iter()
            .find(|e| e.is_node())
            .expect("expected a Node event");
        assert_eq!(node.name(), "a");
        assert!(node.needs_hash());
    }

    #[test]
    fn directories_sort_before_their_own_contents_are_emitted() {
        let tmp = TempDir::new("asure-fs-test").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        File::create(tmp.path().join("sub").join("inner")).unwrap();

        let events = collect(tmp.path());
        let kinds: Vec<_> = events
            .iter()
            .map(|e| match e {
                Event::Enter { name, .. } => format!("enter:{}", name),
                Event::Mark => "mark".to_string(),
                Event::Node { name, .. } => format!("node:{}", name),
                Event::Leave => "leave".to_string(),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "enter:__root__",
                "enter:sub",
                "mark",
                "node:inner",
                "leave",
                "mark",
                "leave",
            ]
        );
    }

    #[test]
    fn estimate_counts_regular_files_only() {
        let tmp = TempDir::new("asure-fs-test").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("a"), b"1234").unwrap();
        std::fs::write(tmp.path().join("sub").join("b"), b"12345678").unwrap();

        let estimate = scan(tmp.path()).unwrap().estimate();
        assert_eq!(estimate.files, 2);
        assert_eq!(estimate.bytes, 12);
    }

    #[test]
    fn symlink_carries_target() {
        let tmp = TempDir::new("asure-fs-test").unwrap();
        symlink("a", tmp.path().join("link")).unwrap();

        let events = collect(tmp.path());
        let node = events.iter().find(|e| e.is_node()).unwrap();
        assert_eq!(node.kind(), "lnk");
        assert_eq!(node.atts().unwrap().get("targ").unwrap(), "a");
    }
}
