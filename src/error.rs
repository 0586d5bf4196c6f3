//! Error types for the SMB URL protocol handler

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for SMB URL operations
pub type Result<T> = std::result::Result<T, Error>;

/// Host error code reported when a read hits end of file (`FFERRTAG('E','O','F',' ')`)
pub const AVERROR_EOF: i32 = -(0x45 | (0x4F << 8) | (0x46 << 16) | (0x20 << 24));

/// System error code reported by the SMB client library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    pub const EPERM: Errno = Errno(libc::EPERM);
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const EIO: Errno = Errno(libc::EIO);
    pub const EBADF: Errno = Errno(libc::EBADF);
    pub const ENOMEM: Errno = Errno(libc::ENOMEM);
    pub const EACCES: Errno = Errno(libc::EACCES);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const ENOTDIR: Errno = Errno(libc::ENOTDIR);
    pub const EISDIR: Errno = Errno(libc::EISDIR);
    pub const EFBIG: Errno = Errno(libc::EFBIG);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const ENOTEMPTY: Errno = Errno(libc::ENOTEMPTY);
    pub const ENOTCONN: Errno = Errno(libc::ENOTCONN);
    pub const EISCONN: Errno = Errno(libc::EISCONN);
    pub const ETIMEDOUT: Errno = Errno(libc::ETIMEDOUT);
    pub const ECONNREFUSED: Errno = Errno(libc::ECONNREFUSED);

    /// Wrap a raw OS error code
    pub const fn new(code: i32) -> Self {
        Errno(code)
    }

    /// The raw OS error code
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Recover the OS error code from an I/O error, falling back on its kind
    pub fn from_io(err: &io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            return Errno(code);
        }
        match err.kind() {
            io::ErrorKind::NotFound => Errno::ENOENT,
            io::ErrorKind::PermissionDenied => Errno::EACCES,
            io::ErrorKind::AlreadyExists => Errno::EEXIST,
            io::ErrorKind::InvalidInput => Errno::EINVAL,
            io::ErrorKind::TimedOut => Errno::ETIMEDOUT,
            io::ErrorKind::ConnectionRefused => Errno::ECONNREFUSED,
            io::ErrorKind::NotConnected => Errno::ENOTCONN,
            io::ErrorKind::OutOfMemory => Errno::ENOMEM,
            _ => Errno::EIO,
        }
    }
}

impl From<io::Error> for Errno {
    fn from(err: io::Error) -> Self {
        Errno::from_io(&err)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

/// Library call that failed during a forwarded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Stat,
    Read,
    Write,
    Seek,
    OpenDir,
    ReadDir,
    Rmdir,
    Unlink,
    Rename,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Operation::Open => "File open failed",
            Operation::Stat => "Cannot stat file",
            Operation::Read => "Read error",
            Operation::Write => "Write error",
            Operation::Seek => "Error during seeking",
            Operation::OpenDir => "Error opening dir",
            Operation::ReadDir => "Error reading dir",
            Operation::Rmdir => "Cannot remove directory",
            Operation::Unlink => "Cannot delete file",
            Operation::Rename => "Cannot rename",
        };
        f.write_str(msg)
    }
}

/// Main error type for SMB URL operations
#[derive(Debug, Error)]
pub enum Error {
    /// The library context could not be created
    #[error("Cannot initialize context: {0}")]
    ContextInit(Errno),

    /// The resource URL could not be parsed
    #[error("Parse url failed: {0}")]
    UrlParse(Errno),

    /// Share connection failed
    #[error("Initialization failed: {0}")]
    Connect(Errno),

    /// A forwarded library call failed
    #[error("{op}: {errno}")]
    Operation { op: Operation, errno: Errno },

    /// Size query before the file size was known
    #[error("Error during seeking: filesize is unknown")]
    SizeUnknown,

    /// Operation needs a handle that is not open
    #[error("No open {0} handle")]
    NotOpen(&'static str),

    /// Connect requested on a context that is already connected
    #[error("Context is already connected")]
    AlreadyConnected,

    /// Allocation failure while building a directory entry
    #[error("Out of memory")]
    OutOfMemory,

    /// Unknown option name or value out of range
    #[error("Invalid option: {0}")]
    InvalidOption(String),
}

impl Error {
    pub(crate) fn op(op: Operation) -> impl FnOnce(Errno) -> Error {
        move |errno| Error::Operation { op, errno }
    }

    /// System error code behind this error
    pub fn errno(&self) -> Errno {
        match self {
            Error::ContextInit(errno)
            | Error::UrlParse(errno)
            | Error::Connect(errno)
            | Error::Operation { errno, .. } => *errno,
            Error::SizeUnknown => Errno::EIO,
            Error::NotOpen(_) => Errno::EBADF,
            Error::AlreadyConnected => Errno::EISCONN,
            Error::OutOfMemory => Errno::ENOMEM,
            Error::InvalidOption(_) => Errno::EINVAL,
        }
    }

    /// Host error code (`AVERROR(errno)`)
    pub fn to_averror(&self) -> i32 {
        -self.errno().code()
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let os = io::Error::from_raw_os_error(err.errno().code());
        io::Error::new(os.kind(), err)
    }
}
