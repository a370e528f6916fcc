//! The Hasher: computing a file's content digest.
//!
//! This is the "expensive att" of §3/§4.3 of the data model: the only
//! attribute that requires reading a file's contents rather than a single
//! `lstat`/`readlink`.

use crate::errors::{Error, IoContext, Result};
use crate::node::fullpath::PathedEvent;
use crate::node::Event;
use crate::progress::Progress;
use data_encoding::HEXLOWER;
use openssl::hash::{Hasher, MessageDigest};
use std::io::Read;
use std::path::Path;

/// A rough up-front estimate of how much hashing work a scan will do,
/// used to size the progress meter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Estimate {
    pub files: u64,
    pub bytes: u64,
}

/// Hash the contents of `path`, returning a 40-character lowercase hex
/// SHA-1 digest.  Opens read-only, preferring a flag that avoids updating
/// the access time, retrying without it if that's denied.
pub fn hash_path(path: &Path) -> Result<String> {
    let mut fd = noatime_open(path).ctx("open", path)?;
    let digest = hash_reader(&mut fd).map_err(|source| Error::io("read", path, source))?;
    Ok(HEXLOWER.encode(&digest))
}

// TODO: Reuse buffer and hasher across calls on the same thread.
fn hash_reader<R: Read>(rd: &mut R) -> std::io::Result<openssl::hash::DigestBytes> {
    let mut h = Hasher::new(MessageDigest::sha1())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let mut buf = vec![0u8; 8192];

    loop {
        let count = rd.read(&mut buf)?;
        if count == 0 {
            break;
        }
        h.update(&buf[0..count])
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    }
    h.finish()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Wrap a path-tracked event stream (typically the output of an
/// `update::combine` merge fed through `node::fullpath::into_tracker`)
/// so that any `Node` still missing its content hash gets one computed
/// from its tracked path. Events that already carry a hash (hoisted by
/// the merge) pass through untouched, so a file proven unchanged by
/// inode+ctime is never reopened.
pub fn fill_hashes<I>(iter: I, estimate: Estimate) -> impl Iterator<Item = Result<Event>>
where
    I: Iterator<Item = Result<PathedEvent>>,
{
    let mut meter = Progress::new(estimate.files, estimate.bytes);
    iter.map(move |item| {
        let PathedEvent { mut event, path } = item?;
        if event.needs_hash() {
            let path = path.ok_or_else(|| Error::parse("hashable node has no path"))?;
            let digest = hash_path(&path)?;
            let len = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            meter.update(1, len);
            event
                .atts_mut()
                .expect("needs_hash implies atts")
                .insert("sha1".to_string(), digest);
        }
        Ok(event)
    })
}

pub(crate) use self::atime_impl::noatime_open;

/// Open the given file, trying to not update the atime if that is
/// possible.  The `custom_flags` method is only stable since Rust 1.10.0.
#[cfg(target_os = "linux")]
mod atime_impl {
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::Path;

    // From linux's fcntl.h, not exported in the libc crate.
    const O_NOATIME: i32 = 0o1000000;

    pub fn noatime_open(name: &Path) -> io::Result<File> {
        // Try opening it first with noatime, and if that fails (commonly
        // EPERM when we don't own the file), try the open again without
        // the option.
        match OpenOptions::new()
            .read(true)
            .custom_flags(O_NOATIME)
            .open(name)
        {
            Ok(f) => Ok(f),
            Err(_) => OpenOptions::new().read(true).open(name),
        }
    }
}

// Other platforms, just use normal open.
#[cfg(not(target_os = "linux"))]
mod atime_impl {
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::path::Path;

    pub fn noatime_open(name: &Path) -> io::Result<File> {
        OpenOptions::new().read(true).open(name)
    }
}
