//! Merging an old sure stream into a freshly walked one, hoisting
//! expensive attributes (the content hash) forward whenever a file's
//! identity proves its content hasn't changed.
//!
//! The output follows the `new` tree's structure exactly: anything only
//! in `old` is discarded, anything only in `new` passes through
//! unchanged, and anything in both gets `maybe_copy_sha` applied before
//! being emitted. This is a lazy `Iterator`, driven by an explicit state
//! stack rather than recursion, so memory use stays proportional to tree
//! depth rather than tree size.

use crate::errors::{Error, Result};
use crate::node::Event;
use std::mem;

/// Wrap `old` and `new` node streams (both positioned before their first
/// event) into a single stream shaped like `new`, with hashes hoisted
/// from `old` where possible.
pub fn combine<IA, IB>(old: IA, new: IB) -> Result<HashCombiner<IA, IB>>
where
    IA: Iterator<Item = Result<Event>>,
    IB: Iterator<Item = Result<Event>>,
{
    HashCombiner::new(old, new)
}

pub struct HashCombiner<IA: Iterator, IB: Iterator> {
    left: Event,
    right: Event,
    left_iter: IA,
    right_iter: IB,
    state: Vec<Frame>,
    seen_root: bool,
}

#[derive(Debug)]
enum Frame {
    /// Discarding one level of a subtree that only exists on the left.
    LeftOnly,
    /// Passing one level of a subtree that only exists on the right
    /// through verbatim.
    RightOnly,
    /// Both sides are in the same directory, comparing subdirectories.
    SameDirs,
    /// Both sides are in the same directory, comparing plain entries.
    SameFiles,
}

enum Step {
    Continue,
    Emit(Event),
}

impl<IA, IB> HashCombiner<IA, IB>
where
    IA: Iterator<Item = Result<Event>>,
    IB: Iterator<Item = Result<Event>>,
{
    fn new(mut left_iter: IA, mut right_iter: IB) -> Result<HashCombiner<IA, IB>> {
        let left = match left_iter.next() {
            None => return Err(Error::parse("old stream is empty")),
            Some(r) => r?,
        };
        let right = match right_iter.next() {
            None => return Err(Error::parse("new stream is empty")),
            Some(r) => r?,
        };

        Ok(HashCombiner {
            left,
            right,
            left_iter,
            right_iter,
            state: Vec::new(),
            seen_root: false,
        })
    }

    /// Advance the left cursor, returning what it had been pointed at.
    /// Once the underlying iterator is spent, keeps presenting `Leave`,
    /// which a well-formed stream will already have used to close out.
    fn next_left(&mut self) -> Result<Event> {
        let next = match self.left_iter.next() {
            None => Event::Leave,
            Some(r) => r?,
        };
        Ok(mem::replace(&mut self.left, next))
    }

    fn next_right(&mut self) -> Result<Event> {
        let next = match self.right_iter.next() {
            None => Event::Leave,
            Some(r) => r?,
        };
        Ok(mem::replace(&mut self.right, next))
    }
}

impl<IA, IB> Iterator for HashCombiner<IA, IB>
where
    IA: Iterator<Item = Result<Event>>,
    IB: Iterator<Item = Result<Event>>,
{
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Result<Event>> {
        loop {
            if self.seen_root && self.state.is_empty() {
                return None;
            }

            let step = match self.state.pop() {
                None => self.visit_root(),
                Some(Frame::SameDirs) => self.visit_samedir(),
                Some(Frame::SameFiles) => self.visit_samefiles(),
                Some(Frame::RightOnly) => self.visit_rightonly(),
                Some(Frame::LeftOnly) => self.visit_leftonly(),
            };

            match step {
                Ok(Step::Continue) => (),
                Ok(Step::Emit(event)) => return Some(Ok(event)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<IA, IB> HashCombiner<IA, IB>
where
    IA: Iterator<Item = Result<Event>>,
    IB: Iterator<Item = Result<Event>>,
{
    fn visit_root(&mut self) -> Result<Step> {
        if !self.left.is_enter() {
            return Err(Error::parse("old stream does not start with an Enter"));
        }
        if !self.right.is_enter() {
            return Err(Error::parse("new stream does not start with an Enter"));
        }
        if self.left.name() != "__root__" || self.right.name() != "__root__" {
            return Err(Error::parse("stream's first event is not the root"));
        }

        self.next_left()?;
        let rnode = self.next_right()?;
        self.state.push(Frame::SameDirs);
        self.seen_root = true;
        Ok(Step::Emit(rnode))
    }

    fn visit_samedir(&mut self) -> Result<Step> {
        match (self.left.is_mark(), self.right.is_mark()) {
            (true, true) => {
                self.next_left()?;
                let rnode = self.next_right()?;
                self.state.push(Frame::SameFiles);
                Ok(Step::Emit(rnode))
            }
            (false, false) => {
                if self.left.name() == self.right.name() {
                    self.state.push(Frame::SameDirs);
                    self.state.push(Frame::SameDirs);
                    self.next_left()?;
                    Ok(Step::Emit(self.next_right()?))
                } else if self.left.name() < self.right.name() {
                    self.next_left()?;
                    self.state.push(Frame::SameDirs);
                    self.state.push(Frame::LeftOnly);
                    Ok(Step::Continue)
                } else {
                    self.state.push(Frame::SameDirs);
                    self.state.push(Frame::RightOnly);
                    Ok(Step::Emit(self.next_right()?))
                }
            }
            (false, true) => {
                self.next_left()?;
                self.state.push(Frame::SameDirs);
                self.state.push(Frame::LeftOnly);
                Ok(Step::Continue)
            }
            (true, false) => {
                self.state.push(Frame::SameDirs);
                self.state.push(Frame::RightOnly);
                Ok(Step::Emit(self.next_right()?))
            }
        }
    }

    fn visit_samefiles(&mut self) -> Result<Step> {
        match (self.left.is_leave(), self.right.is_leave()) {
            (true, true) => {
                self.next_left()?;
                Ok(Step::Emit(self.next_right()?))
            }
            (true, false) => {
                self.state.push(Frame::SameFiles);
                Ok(Step::Emit(self.next_right()?))
            }
            (false, true) => {
                self.state.push(Frame::SameFiles);
                self.next_left()?;
                Ok(Step::Continue)
            }
            (false, false) => {
                self.state.push(Frame::SameFiles);
                if self.left.name() == self.right.name() {
                    let left = self.next_left()?;
                    let mut right = self.next_right()?;
                    maybe_copy_sha(&left, &mut right);
                    Ok(Step::Emit(right))
                } else if self.left.name() < self.right.name() {
                    self.next_left()?;
                    Ok(Step::Continue)
                } else {
                    Ok(Step::Emit(self.next_right()?))
                }
            }
        }
    }

    /// Pass a subtree present only on the right through untouched.
    fn visit_rightonly(&mut self) -> Result<Step> {
        if self.right.is_enter() {
            self.state.push(Frame::RightOnly);
            self.state.push(Frame::RightOnly);
        } else if self.right.is_leave() {
            // This level is done; don't push anything back.
        } else {
            self.state.push(Frame::RightOnly);
        }
        Ok(Step::Emit(self.next_right()?))
    }

    /// Discard a subtree present only on the left.
    fn visit_leftonly(&mut self) -> Result<Step> {
        if self.left.is_enter() {
            self.state.push(Frame::LeftOnly);
            self.state.push(Frame::LeftOnly);
        } else if self.left.is_leave() {
            // This level is done.
        } else {
            self.state.push(Frame::LeftOnly);
        }
        self.next_left()?;
        Ok(Step::Continue)
    }
}

/// Carry `old`'s `sha1` forward onto `new` if both are regular files
/// with matching `ino`/`ctime` (proof enough that the content didn't
/// change) and `new` doesn't already have one.
fn maybe_copy_sha(old: &Event, new: &mut Event) {
    let latts = match old.atts() {
        Some(a) => a,
        None => return,
    };
    let sha1 = match latts.get("sha1") {
        Some(v) => v.clone(),
        None => return,
    };
    if latts.get("kind").map(String::as_str) != Some("file") {
        return;
    }

    let ratts = match new.atts_mut() {
        Some(a) => a,
        None => return,
    };
    if ratts.get("kind").map(String::as_str) != Some("file") {
        return;
    }
    if ratts.contains_key("sha1") {
        return;
    }
    if latts.get("ino") != ratts.get("ino") || latts.get("ctime") != ratts.get("ctime") {
        return;
    }

    ratts.insert("sha1".to_string(), sha1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::AttMap;

    fn dir(name: &str) -> Event {
        let mut atts = AttMap::new();
        atts.insert("kind".to_string(), "dir".to_string());
        Event::Enter {
            name: name.to_string(),
            atts,
        }
    }

    fn file(name: &str, atts: &[(&str, &str)]) -> Event {
        let mut m = AttMap::new();
        m.insert("kind".to_string(), "file".to_string());
        for (k, v) in atts {
            m.insert(k.to_string(), v.to_string());
        }
        Event::Node {
            name: name.to_string(),
            atts: m,
        }
    }

    #[test]
    fn hoists_sha1_when_identity_matches() {
        let old = vec![
            Ok(dir("__root__")),
            Ok(Event::Mark),
            Ok(file("a", &[("ino", "1"), ("ctime", "100"), ("sha1", "abc")])),
            Ok(Event::Leave),
        ];
        let new = vec![
            Ok(dir("__root__")),
            Ok(Event::Mark),
            Ok(file("a", &[("ino", "1"), ("ctime", "100")])),
            Ok(Event::Leave),
        ];

        let merged: Vec<Event> = combine(old.into_iter(), new.into_iter())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();

        let a = merged.iter().find(|e| e.get_name() == Some("a")).unwrap();
        assert_eq!(a.atts().unwrap().get("sha1"), Some(&"abc".to_string()));
    }

    #[test]
    fn does_not_hoist_when_ctime_differs() {
        let old = vec![
            Ok(dir("__root__")),
            Ok(Event::Mark),
            Ok(file("a", &[("ino", "1"), ("ctime", "100"), ("sha1", "abc")])),
            Ok(Event::Leave),
        ];
        let new = vec![
            Ok(dir("__root__")),
            Ok(Event::Mark),
            Ok(file("a", &[("ino", "1"), ("ctime", "200")])),
            Ok(Event::Leave),
        ];

        let merged: Vec<Event> = combine(old.into_iter(), new.into_iter())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();

        let a = merged.iter().find(|e| e.get_name() == Some("a")).unwrap();
        assert!(a.needs_hash());
    }

    #[test]
    fn output_matches_new_tree_shape_even_with_deletions_and_additions() {
        let old = vec![
            Ok(dir("__root__")),
            Ok(Event::Mark),
            Ok(file("gone", &[])),
            Ok(file("same", &[("ino", "1"), ("ctime", "1"), ("sha1", "x")])),
            Ok(Event::Leave),
        ];
        let new = vec![
            Ok(dir("__root__")),
            Ok(Event::Mark),
            Ok(file("added", &[])),
            Ok(file("same", &[("ino", "1"), ("ctime", "1")])),
            Ok(Event::Leave),
        ];

        let merged: Vec<Event> = combine(old.into_iter(), new.into_iter())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();

        let names: Vec<&str> = merged.iter().filter_map(|e| e.get_name()).collect();
        assert_eq!(names, vec!["__root__", "added", "same"]);
    }

    #[test]
    fn new_subdirectory_passes_through_untouched() {
        let old = vec![Ok(dir("__root__")), Ok(Event::Mark), Ok(Event::Leave)];
        let new = vec![
            Ok(dir("__root__")),
            Ok(dir("sub")),
            Ok(Event::Mark),
            Ok(file("inner", &[])),
            Ok(Event::Leave),
            Ok(Event::Mark),
            Ok(Event::Leave),
        ];

        let new_len = new.len();
        let merged: Vec<Event> = combine(old.into_iter(), new.into_iter())
            .unwrap()
            .map(|e| e.unwrap())
            .collect();

        assert_eq!(merged.len(), new_len);
        let names: Vec<&str> = merged.iter().filter_map(|e| e.get_name()).collect();
        assert_eq!(names, vec!["__root__", "sub", "inner"]);
    }
}
