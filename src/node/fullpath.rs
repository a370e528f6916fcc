//! Augment an event stream with the full filesystem path each event
//! refers to.
//!
//! Event names are carried in their quoted wire form everywhere else in
//! this crate; this is the one place that unescapes them back to raw
//! bytes, since it's the one place that needs to build an actual `Path`.
//!
//! Unfortunately Rust's `Iterator` doesn't tie any lifetime to the
//! iterator itself, which makes it awkward to hand out a borrowed path.
//! We just allocate a fresh `PathBuf` per event instead; if that ever
//! shows up in a profile, a cursor borrowing into a shared buffer would
//! avoid it.

use crate::errors::{Error, Result};
use crate::escape::Unescape;
use crate::node::Event;
use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

/// Wrap `iter` so each event comes with the full path it refers to.
/// `root` is the real directory the walk started from (the stream
/// itself only ever names its top entry `"__root__"`).
pub fn into_tracker<I>(iter: I, root: &str) -> Result<impl Iterator<Item = Result<PathedEvent>>>
where
    I: Iterator<Item = Result<Event>>,
{
    let root: OsString = OsStringExt::from_vec(unescape(root)?);
    let mut cur = Path::new(&root).to_path_buf();
    let mut at_root = true;

    Ok(iter.map(move |event| {
        let event = event?;
        let path = match &event {
            Event::Enter { name, .. } => {
                if at_root {
                    if name != "__root__" {
                        return Err(Error::parse("stream's first event is not the root"));
                    }
                    at_root = false;
                } else {
                    let name: OsString = OsStringExt::from_vec(unescape(name)?);
                    cur.push(&name);
                }
                Some(cur.clone())
            }
            Event::Node { name, .. } => {
                let name: OsString = OsStringExt::from_vec(unescape(name)?);
                cur.push(&name);
                Some(cur.clone())
            }
            _ => None,
        };

        let do_pop = event.is_node() || event.is_leave();
        let result = Ok(PathedEvent { event, path });

        if do_pop {
            cur.pop();
        }

        result
    }))
}

fn unescape(name: &str) -> Result<Vec<u8>> {
    name.unescape()
        .map_err(|e| Error::parse(format!("bad escaped name {:?}: {}", name, e)))
}

/// An event paired with the path it applies to. `Mark` and `Leave`
/// carry no path of their own (`None`); `Enter` and `Node` do.
#[derive(Debug)]
pub struct PathedEvent {
    pub event: Event,
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::AttMap;

    fn node(name: &str, kind: &str) -> Event {
        let mut atts = AttMap::new();
        atts.insert("kind".to_string(), kind.to_string());
        Event::Node {
            name: name.to_string(),
            atts,
        }
    }

    fn enter(name: &str) -> Event {
        let mut atts = AttMap::new();
        atts.insert("kind".to_string(), "dir".to_string());
        Event::Enter {
            name: name.to_string(),
            atts,
        }
    }

    #[test]
    fn tracks_nested_paths() {
        let events = vec![
            Ok(enter("__root__")),
            Ok(enter("sub")),
            Ok(Event::Mark),
            Ok(node("inner", "file")),
            Ok(Event::Leave),
            Ok(Event::Mark),
            Ok(node("top", "file")),
            Ok(Event::Leave),
        ];

        let paths: Vec<Option<PathBuf>> = into_tracker(events.into_iter(), "/tmp/root")
            .unwrap()
            .map(|p| p.unwrap().path)
            .collect();

        assert_eq!(paths[0], Some(PathBuf::from("/tmp/root")));
        assert_eq!(paths[1], Some(PathBuf::from("/tmp/root/sub")));
        assert_eq!(paths[2], None);
        assert_eq!(paths[3], Some(PathBuf::from("/tmp/root/sub/inner")));
        assert_eq!(paths[5], None);
        assert_eq!(paths[6], Some(PathBuf::from("/tmp/root/top")));
    }

    #[test]
    fn rejects_stream_not_starting_at_root() {
        let events = vec![Ok(node("a", "file"))];
        let mut tracker = into_tracker(events.into_iter(), "/tmp/root").unwrap();
        match tracker.next() {
            Some(Err(Error::Parse { .. })) => (),
            other => panic!("expected Parse error, got {:?}", other),
        }
    }
}
