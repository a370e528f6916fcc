//! The node model: the four event kinds that make up a sure stream, and
//! the pure (no I/O) encoding/decoding of a single line of the wire
//! format.  Reading and writing whole streams, including the gzip
//! framing and file rotation, lives in `store`.
//!
//! A stream is a linearization of a tree:
//!
//! ```text
//! ENTER (subdir)* MARK NODE* LEAVE
//! ```
//!
//! `Enter` and `Leave` bracket a directory; `Mark` separates the nested
//! subdirectories (each itself an `Enter`...`Leave` run) from the plain
//! entries (`Node`) that live directly in that directory.
//!
//! Names and attribute values carried by a node are already in their
//! quoted wire form (see `escape`), both when freshly produced by a
//! filesystem walk and when parsed back out of a surefile. They're only
//! unescaped to raw bytes at the point something needs to open the
//! actual path, which keeps comparison and serialization from ever
//! having to think about non-UTF-8 names.

use crate::errors::{Error, Result};
use std::collections::BTreeMap;
use std::io::Write;

pub mod fs;
pub mod fullpath;

/// Attribute name/value pairs attached to an `Enter` or `Node` event.
/// Keys are plain ASCII identifiers (`"kind"`, `"uid"`, `"sha1"`, ...);
/// values are pre-escaped wire tokens. A `BTreeMap` keeps iteration
/// order deterministic, which matters since we write these straight
/// back out.
pub type AttMap = BTreeMap<String, String>;

/// One event out of a sure stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Entering a directory.
    Enter { name: String, atts: AttMap },
    /// The boundary between a directory's subdirectories and its plain
    /// entries.
    Mark,
    /// A non-directory entry (file, symlink, device, ...); `atts["kind"]`
    /// says which.
    Node { name: String, atts: AttMap },
    /// Leaving the directory most recently entered.
    Leave,
}

impl Event {
    pub fn is_enter(&self) -> bool {
        matches!(self, Event::Enter { .. })
    }

    pub fn is_mark(&self) -> bool {
        matches!(self, Event::Mark)
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Event::Node { .. })
    }

    pub fn is_leave(&self) -> bool {
        matches!(self, Event::Leave)
    }

    pub fn is_reg_file(&self) -> bool {
        match self {
            Event::Node { atts, .. } => atts.get("kind").map(|k| k.as_str()) == Some("file"),
            _ => false,
        }
    }

    /// Whether this node's content hash still needs to be computed (it's
    /// a regular file and doesn't already carry one, typically hoisted
    /// from a prior surefile).
    pub fn needs_hash(&self) -> bool {
        match self {
            Event::Node { atts, .. } => {
                atts.get("kind").map(|k| k.as_str()) == Some("file") && !atts.contains_key("sha1")
            }
            _ => false,
        }
    }

    /// The name carried by `Enter` and `Node` events, in its quoted wire
    /// form. Panics on `Mark`/`Leave`, which have none.
    pub fn name(&self) -> &str {
        self.get_name().expect("event has no name")
    }

    pub fn get_name(&self) -> Option<&str> {
        match self {
            Event::Enter { name, .. } => Some(name),
            Event::Node { name, .. } => Some(name),
            _ => None,
        }
    }

    /// A short label for diagnostics: the entry's `kind` attribute, or
    /// `"???"` if it isn't present.
    pub fn kind(&self) -> &str {
        self.atts()
            .and_then(|a| a.get("kind"))
            .map(|k| k.as_str())
            .unwrap_or("???")
    }

    pub fn atts(&self) -> Option<&AttMap> {
        match self {
            Event::Enter { atts, .. } => Some(atts),
            Event::Node { atts, .. } => Some(atts),
            _ => None,
        }
    }

    pub fn atts_mut(&mut self) -> Option<&mut AttMap> {
        match self {
            Event::Enter { atts, .. } => Some(atts),
            Event::Node { atts, .. } => Some(atts),
            _ => None,
        }
    }
}

/// Write a single wire-format line for `event` (no trailing newline).
pub(crate) fn encode_line<W: Write>(out: &mut W, event: &Event) -> Result<()> {
    let res = match event {
        Event::Enter { name, atts } => header(out, 'd', name, atts),
        Event::Node { name, atts } => header(out, 'f', name, atts),
        Event::Mark => write!(out, "-"),
        Event::Leave => write!(out, "u"),
    };
    res.map_err(|source| Error::io("write", "<surefile>", source))
}

fn header<W: Write>(out: &mut W, kind: char, name: &str, atts: &AttMap) -> std::io::Result<()> {
    write!(out, "{}{} [", kind, name)?;
    for (k, v) in atts {
        write!(out, "{} {} ", k, v)?;
    }
    write!(out, "]")
}

/// Parse a single wire-format line (without its trailing newline) back
/// into an `Event`.
pub(crate) fn decode_line(line: &[u8]) -> Result<Event> {
    if line.is_empty() {
        return Err(Error::parse("empty surefile line"));
    }
    match line[0] {
        b'd' => {
            let (name, atts) = decode_entity(&line[1..])?;
            Ok(Event::Enter { name, atts })
        }
        b'f' => {
            let (name, atts) = decode_entity(&line[1..])?;
            Ok(Event::Node { name, atts })
        }
        b'-' => Ok(Event::Mark),
        b'u' => Ok(Event::Leave),
        ch => Err(Error::parse(format!(
            "unrecognized surefile event code {:?}",
            ch as char
        ))),
    }
}

fn decode_entity(text: &[u8]) -> Result<(String, AttMap)> {
    let (name, mut text) = take_token(text)?;
    if text.first() != Some(&b'[') {
        return Err(Error::parse("surefile entry missing attribute list"));
    }
    text = &text[1..];

    let mut atts = AttMap::new();
    loop {
        match text.first() {
            None => return Err(Error::parse("truncated surefile attribute list")),
            Some(b']') => break,
            _ => {
                let (key, rest) = take_token(text)?;
                let (value, rest) = take_token(rest)?;
                atts.insert(key, value);
                text = rest;
            }
        }
    }
    Ok((name, atts))
}

/// Pull a single space-terminated token off the front of `text`.
fn take_token(text: &[u8]) -> Result<(String, &[u8])> {
    let space = text
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| Error::parse("truncated surefile token"))?;
    let token = std::str::from_utf8(&text[..space])
        .map_err(|_| Error::parse("surefile token is not valid UTF-8"))?
        .to_string();
    Ok((token, &text[space + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atts(pairs: &[(&str, &str)]) -> AttMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn round_trips_enter() {
        let ev = Event::Enter {
            name: "sub".to_string(),
            atts: atts(&[("kind", "dir"), ("uid", "0")]),
        };
        let mut buf = Vec::new();
        encode_line(&mut buf, &ev).unwrap();
        assert_eq!(decode_line(&buf).unwrap(), ev);
    }

    #[test]
    fn round_trips_node_with_escaped_name() {
        let ev = Event::Node {
            name: "weird=20name".to_string(),
            atts: atts(&[("kind", "file"), ("sha1", "abc123")]),
        };
        let mut buf = Vec::new();
        encode_line(&mut buf, &ev).unwrap();
        assert_eq!(decode_line(&buf).unwrap(), ev);
    }

    #[test]
    fn mark_and_leave_are_bare_codes() {
        let mut buf = Vec::new();
        encode_line(&mut buf, &Event::Mark).unwrap();
        assert_eq!(buf, b"-");
        assert_eq!(decode_line(b"-").unwrap(), Event::Mark);

        buf.clear();
        encode_line(&mut buf, &Event::Leave).unwrap();
        assert_eq!(buf, b"u");
        assert_eq!(decode_line(b"u").unwrap(), Event::Leave);
    }

    #[test]
    fn needs_hash_only_for_unhashed_regular_files() {
        let plain = Event::Node {
            name: "a".to_string(),
            atts: atts(&[("kind", "file")]),
        };
        assert!(plain.needs_hash());

        let hashed = Event::Node {
            name: "a".to_string(),
            atts: atts(&[("kind", "file"), ("sha1", "deadbeef")]),
        };
        assert!(!hashed.needs_hash());

        let dir = Event::Node {
            name: "a".to_string(),
            atts: atts(&[("kind", "dir")]),
        };
        assert!(!dir.needs_hash());
    }

    #[test]
    fn rejects_unknown_event_code() {
        match decode_line(b"x") {
            Err(Error::Parse { .. }) => (),
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn rejects_truncated_attribute_list() {
        match decode_line(b"fname [kind file") {
            Err(Error::Parse { .. }) => (),
            other => panic!("expected Parse error, got {:?}", other),
        }
    }
}
