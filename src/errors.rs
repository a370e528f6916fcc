// Errors.

use std::io;
use std::path::PathBuf;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while scanning a tree, reading or writing a
/// surefile, or comparing two of them.
#[derive(Debug, failure::Fail)]
pub enum Error {
    /// A system call failed.  `op` names the call (`"opendir"`, `"lstat"`,
    /// `"readlink"`, `"open"`, `"read"`, `"rename"`, ...), `path` is the
    /// filesystem object involved.
    #[fail(display = "{} failed on {:?}: {}", op, path, source)]
    Io {
        op: &'static str,
        path: PathBuf,
        #[cause]
        source: io::Error,
    },

    /// A surefile (or a stream claiming to be one) did not match the
    /// grammar: bad magic, an unknown event code, a broken hex escape, a
    /// node appearing out of turn, and so on.
    #[fail(display = "{}", msg)]
    Parse { msg: String },

    /// A request that was syntactically fine but semantically unusable
    /// (e.g. a surefile path that resolves to a directory that doesn't
    /// exist).  Not the same as a `structopt` argument-parsing failure,
    /// which never reaches this type.
    #[fail(display = "{}", msg)]
    Usage { msg: String },
}

impl Error {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Error {
        Error::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn parse(msg: impl Into<String>) -> Error {
        Error::Parse { msg: msg.into() }
    }

    pub fn usage(msg: impl Into<String>) -> Error {
        Error::Usage { msg: msg.into() }
    }
}

/// Extension trait for turning a plain `io::Result` into our `Result`,
/// attaching the operation name and path at the point of the call instead
/// of threading them through every signature.
pub(crate) trait IoContext<T> {
    fn ctx(self, op: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn ctx(self, op: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::io(op, path, source))
    }
}
