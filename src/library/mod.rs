//! SMB client library interface
//!
//! The protocol handler performs no SMB work of its own. Negotiation,
//! authentication, signing and every PDU exchange belong to a client library
//! plugged in through [`SmbLibrary`], which hands out one [`SmbContext`] per
//! connection. Fallible calls report a system error code, the way the C
//! client libraries report `errno`.

pub mod local;
pub mod memory;
#[cfg(feature = "smbclient")]
pub mod smbclient;

use crate::error::Errno;
use crate::protocol::AvioFlags;
use crate::url::SmbUrl;
use bitflags::bitflags;
use std::io::SeekFrom;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

pub use local::{LocalLibrary, LocalShare};
pub use memory::MemoryLibrary;
#[cfg(feature = "smbclient")]
pub use smbclient::SmbClientLibrary;

/// Result of a library call
pub type LibResult<T> = std::result::Result<T, Errno>;

bitflags! {
    /// SMB2 negotiate security mode
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecurityMode: u16 {
        const SIGNING_ENABLED = 0x0001;
        const SIGNING_REQUIRED = 0x0002;
    }
}

/// Data access requested by an open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Open semantics: access plus create/truncate, as in `O_*` flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub access: Access,
    pub create: bool,
    pub truncate: bool,
}

impl OpenMode {
    /// Open an existing resource for reading
    pub const fn read_only() -> Self {
        Self {
            access: Access::ReadOnly,
            create: false,
            truncate: false,
        }
    }

    /// Open an existing resource for writing, without creating or truncating it
    pub const fn write_only() -> Self {
        Self {
            access: Access::WriteOnly,
            create: false,
            truncate: false,
        }
    }

    /// Map I/O layer access flags to open semantics
    ///
    /// Any request that includes writing creates the file when missing and
    /// truncates it when `truncate` is set. Everything else is a plain read.
    pub fn for_flags(flags: AvioFlags, truncate: bool) -> Self {
        let access = if flags.contains(AvioFlags::READ_WRITE) {
            Access::ReadWrite
        } else if flags.contains(AvioFlags::WRITE) {
            Access::WriteOnly
        } else {
            return Self::read_only();
        };
        Self {
            access,
            create: true,
            truncate,
        }
    }

    pub fn readable(&self) -> bool {
        matches!(self.access, Access::ReadOnly | Access::ReadWrite)
    }

    pub fn writable(&self) -> bool {
        matches!(self.access, Access::WriteOnly | Access::ReadWrite)
    }
}

/// Object type reported by stat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Link,
}

/// Metadata of a remote object; times are seconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub file_type: FileType,
    pub ino: u64,
    pub nlink: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub btime: i64,
}

/// Directory entry as returned by the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub name: String,
    pub stat: Stat,
}

/// Whole seconds since the Unix epoch, rounded down and saturating
pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
        Err(before) => {
            let before = before.duration();
            let secs = i64::try_from(before.as_secs()).unwrap_or(i64::MAX);
            if before.subsec_nanos() > 0 {
                secs.saturating_neg().saturating_sub(1)
            } else {
                secs.saturating_neg()
            }
        }
    }
}

/// Factory for library contexts
pub trait SmbLibrary {
    type Context: SmbContext;

    /// Create a fresh, unconnected context
    fn init_context(&self) -> LibResult<Self::Context>;
}

/// One library connection context
///
/// Dropping the context destroys it. Paths are relative to the connected
/// share.
pub trait SmbContext {
    /// Open file handle
    type File;
    /// Open directory handle
    type Dir;

    /// Split an `smb://` URL into its components
    fn parse_url(&mut self, url: &str) -> LibResult<SmbUrl> {
        SmbUrl::parse(url).map_err(|e| {
            debug!("Rejected URL: {}", e);
            Errno::from(e)
        })
    }

    fn set_security_mode(&mut self, mode: SecurityMode);

    fn set_timeout(&mut self, timeout: Duration);

    fn set_workstation(&mut self, workstation: &str);

    fn set_domain(&mut self, domain: &str);

    fn set_password(&mut self, password: &str);

    /// Negotiate, authenticate and connect to `share` on `server`
    fn connect_share(&mut self, server: &str, share: &str, user: Option<&str>) -> LibResult<()>;

    fn disconnect_share(&mut self) -> LibResult<()>;

    fn open(&mut self, path: &str, mode: OpenMode) -> LibResult<Self::File>;

    fn close(&mut self, file: Self::File) -> LibResult<()>;

    fn stat(&mut self, path: &str) -> LibResult<Stat>;

    /// Read at the handle's offset; `Ok(0)` means end of file
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> LibResult<usize>;

    /// Write at the handle's offset; may write less than `buf.len()`
    fn write(&mut self, file: &mut Self::File, buf: &[u8]) -> LibResult<usize>;

    /// Reposition the handle's offset and return the new absolute offset
    fn lseek(&mut self, file: &mut Self::File, pos: SeekFrom) -> LibResult<u64>;

    fn opendir(&mut self, path: &str) -> LibResult<Self::Dir>;

    /// Next raw entry, including `.` and `..`; `None` at the end
    fn readdir<'d>(&mut self, dir: &'d mut Self::Dir) -> LibResult<Option<&'d Dirent>>;

    fn closedir(&mut self, dir: Self::Dir);

    fn rmdir(&mut self, path: &str) -> LibResult<()>;

    fn unlink(&mut self, path: &str) -> LibResult<()>;

    fn rename(&mut self, old_path: &str, new_path: &str) -> LibResult<()>;
}
