//! Generic URL protocol interface
//!
//! The I/O layer drives every network resource through [`UrlProtocol`]: a
//! context is created for one URL, then opened either as a file (read, write,
//! seek) or as a directory (read_dir), and finally closed. Delete and move are
//! one-shot operations on an unopened context.

pub mod stream;

use crate::error::{Result, AVERROR_EOF};
use bitflags::bitflags;

pub use stream::UrlStream;

bitflags! {
    /// Access requested when opening a resource
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AvioFlags: u32 {
        const READ = 0x0001;
        const WRITE = 0x0002;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

bitflags! {
    /// Capabilities advertised by a protocol
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtocolFlags: u32 {
        const NESTED_SCHEME = 0x0001;
        const NETWORK = 0x0002;
    }
}

/// Host `whence` value of a size query
pub const AVSEEK_SIZE: i32 = 0x10000;

/// Seek origin, plus the size query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
    /// Report the total resource size instead of repositioning
    Size,
}

impl Whence {
    /// Decode a host `whence` value (`SEEK_SET`, `SEEK_CUR`, `SEEK_END` or `AVSEEK_SIZE`)
    pub fn from_raw(whence: i32) -> Option<Self> {
        match whence {
            libc::SEEK_SET => Some(Whence::Set),
            libc::SEEK_CUR => Some(Whence::Cur),
            libc::SEEK_END => Some(Whence::End),
            // AVSEEK_FORCE may be or-ed into a size query
            w if w & AVSEEK_SIZE != 0 => Some(Whence::Size),
            _ => None,
        }
    }
}

/// Result of a read that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were stored at the start of the buffer
    Data(usize),
    /// No more data
    Eof,
}

impl ReadOutcome {
    /// Host return value: byte count, or `AVERROR_EOF`
    pub fn to_raw(self) -> i32 {
        match self {
            ReadOutcome::Data(n) => i32::try_from(n).unwrap_or(i32::MAX),
            ReadOutcome::Eof => AVERROR_EOF,
        }
    }
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Unknown,
    Directory,
    File,
}

/// One directory listing entry
///
/// Numeric fields use `-1` for "not provided"; timestamps are microseconds
/// since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub entry_type: EntryType,
    pub size: i64,
    pub modification_timestamp: i64,
    pub access_timestamp: i64,
    pub status_change_timestamp: i64,
    pub user_id: i64,
    pub group_id: i64,
    pub filemode: i64,
}

impl DirEntry {
    /// Entry with nothing but a name and type
    pub fn new(name: String, entry_type: EntryType) -> Self {
        Self {
            name,
            entry_type,
            size: -1,
            modification_timestamp: -1,
            access_timestamp: -1,
            status_change_timestamp: -1,
            user_id: -1,
            group_id: -1,
            filemode: -1,
        }
    }
}

/// Operations a URL protocol exposes to the I/O layer
///
/// A context is bound to one URL when it is created.
pub trait UrlProtocol {
    /// Scheme name, e.g. `"smb"`
    fn name(&self) -> &'static str;

    /// Capability flags
    fn flags(&self) -> ProtocolFlags;

    /// Open the resource as a file
    fn open(&mut self, flags: AvioFlags) -> Result<()>;

    /// Read up to `buf.len()` bytes at the current offset
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Write `buf` at the current offset; may write fewer bytes than given
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Reposition the offset and return it, or answer a size query
    fn seek(&mut self, pos: i64, whence: Whence) -> Result<i64>;

    /// Release everything the context holds
    fn close(&mut self) -> Result<()>;

    /// Remove the resource
    fn delete(&mut self) -> Result<()>;

    /// Rename the resource to `dst`
    fn move_to(&mut self, dst: &str) -> Result<()>;

    /// Open the resource as a directory
    fn open_dir(&mut self) -> Result<()>;

    /// Next directory entry, `None` once the listing is exhausted
    fn read_dir(&mut self) -> Result<Option<DirEntry>>;

    /// Finish a directory listing
    fn close_dir(&mut self) -> Result<()>;
}
