//! On-disk surefile storage: naming, gzip framing, and the rotate-on-close
//! discipline that keeps a crash from destroying the previous snapshot.
//!
//! A surefile is named by a "base" path with three possible suffixes:
//! `.dat.gz` (the current snapshot), `.bak.gz` (the one before that), and
//! `.0.gz` (a write in progress, never meant to be read). `Surefile::new`
//! accepts any of these, or a bare base, or an existing directory (in
//! which case the base defaults to `2sure` inside it), and normalizes to
//! the base path.

use crate::errors::{Error, IoContext, Result};
use crate::node::{self, Event};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8] = b"asure-2.0\n-----\n";

/// A surefile, named by its base path (no suffix).
#[derive(Clone, Debug)]
pub struct Surefile {
    base: PathBuf,
}

impl Surefile {
    /// Resolve `text` (a directory, a bare base, or any of the three
    /// suffixed names) to the surefile it names.
    pub fn new(text: &str) -> Result<Surefile> {
        let p = Path::new(text);

        if p.is_dir() {
            return Ok(Surefile { base: p.join("2sure") });
        }

        let dir = match p.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let name = p
            .file_name()
            .ok_or_else(|| Error::usage(format!("{:?} has no final path component", p)))?
            .to_str()
            .ok_or_else(|| Error::usage(format!("{:?} is not valid UTF-8", p)))?;

        let name = name.strip_suffix(".gz").unwrap_or(name);
        let name = name
            .strip_suffix(".dat")
            .or_else(|| name.strip_suffix(".bak"))
            .or_else(|| name.strip_suffix(".0"))
            .unwrap_or(name);

        Ok(Surefile { base: dir.join(name) })
    }

    fn dat_path(&self) -> PathBuf {
        suffixed(&self.base, "dat.gz")
    }

    fn bak_path(&self) -> PathBuf {
        suffixed(&self.base, "bak.gz")
    }

    fn tmp_path(&self) -> PathBuf {
        suffixed(&self.base, "0.gz")
    }

    /// Write `events` to a fresh temp file and atomically rotate it into
    /// place as the new current snapshot.
    pub fn save<I>(&self, events: I) -> Result<()>
    where
        I: Iterator<Item = Result<Event>>,
    {
        let mut writer = SurefileWriter::create(self)?;
        for event in events {
            writer.write_event(&event?)?;
        }
        writer.close()
    }

    /// Open the current snapshot for reading.
    pub fn load(&self) -> Result<SurefileReader<GzDecoder<File>>> {
        self.load_path(&self.dat_path())
    }

    /// Open the prior snapshot (the one before the last `save`) for
    /// reading.
    pub fn load_prior(&self) -> Result<SurefileReader<GzDecoder<File>>> {
        self.load_path(&self.bak_path())
    }

    fn load_path(&self, path: &Path) -> Result<SurefileReader<GzDecoder<File>>> {
        let file = File::open(path).ctx("open", path)?;
        SurefileReader::new(GzDecoder::new(file), path.to_path_buf())
    }
}

fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Streaming writer for a single surefile. Must be consumed with
/// `close()` to become the new current snapshot; if dropped without
/// closing, the partial temp file is removed and `.dat.gz`/`.bak.gz` are
/// left untouched.
pub struct SurefileWriter {
    tmp_path: PathBuf,
    dat_path: PathBuf,
    bak_path: PathBuf,
    inner: Option<GzEncoder<BufWriter<File>>>,
}

impl SurefileWriter {
    fn create(sure: &Surefile) -> Result<SurefileWriter> {
        let tmp_path = sure.tmp_path();
        let file = File::create(&tmp_path).ctx("create", &tmp_path)?;
        let mut inner = GzEncoder::new(BufWriter::new(file), Compression::default());
        inner
            .write_all(MAGIC)
            .map_err(|e| Error::io("write", tmp_path.clone(), e))?;

        Ok(SurefileWriter {
            tmp_path,
            dat_path: sure.dat_path(),
            bak_path: sure.bak_path(),
            inner: Some(inner),
        })
    }

    pub fn write_event(&mut self, event: &Event) -> Result<()> {
        let out = self
            .inner
            .as_mut()
            .expect("write_event called after close");
        node::encode_line(out, event)?;
        out.write_all(b"\n")
            .map_err(|e| Error::io("write", self.tmp_path.clone(), e))
    }

    /// Finish the gzip stream and rotate it into place: the current
    /// `.dat.gz` becomes `.bak.gz` (if there was one), and the freshly
    /// written temp file becomes the new `.dat.gz`.
    pub fn close(mut self) -> Result<()> {
        let inner = self.inner.take().expect("close called twice");
        inner
            .finish()
            .map_err(|e| Error::io("write", self.tmp_path.clone(), e))?;

        match fs::rename(&self.dat_path, &self.bak_path) {
            Ok(()) => (),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (),
            Err(e) => return Err(Error::io("rename", self.dat_path.clone(), e)),
        }
        fs::rename(&self.tmp_path, &self.dat_path).ctx("rename", self.tmp_path.clone())?;
        Ok(())
    }
}

impl Drop for SurefileWriter {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Reads a surefile back into a stream of events. Tracks nesting depth
/// so it knows when the final `LEAVE` has been seen.
pub struct SurefileReader<R> {
    lines: io::Split<BufReader<R>>,
    depth: usize,
    done: bool,
    source: PathBuf,
}

impl<R: Read> SurefileReader<R> {
    fn new(inner: R, source: PathBuf) -> Result<SurefileReader<R>> {
        let mut rd = BufReader::new(inner);
        let mut magic = [0u8; MAGIC.len()];
        rd.read_exact(&mut magic)
            .map_err(|e| Error::io("read", source.clone(), e))?;
        if magic != *MAGIC {
            return Err(Error::parse(format!("{:?} is not a surefile", source)));
        }

        Ok(SurefileReader {
            lines: rd.split(b'\n'),
            depth: 0,
            done: false,
            source,
        })
    }
}

impl<R: Read> Iterator for SurefileReader<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Result<Event>> {
        if self.done {
            return None;
        }

        let line = match self.lines.next() {
            None => {
                return Some(Err(Error::parse(format!(
                    "{:?}: truncated surefile",
                    self.source
                ))))
            }
            Some(Err(e)) => return Some(Err(Error::io("read", self.source.clone(), e))),
            Some(Ok(line)) => line,
        };

        let event = match node::decode_line(&line) {
            Ok(event) => event,
            Err(e) => return Some(Err(e)),
        };

        match &event {
            Event::Enter { .. } => self.depth += 1,
            Event::Leave => {
                self.depth -= 1;
                if self.depth == 0 {
                    self.done = true;
                }
            }
            _ => (),
        }

        Some(Ok(event))
    }
}
