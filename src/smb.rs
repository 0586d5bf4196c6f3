//! SMB protocol handler
//!
//! [`SmbProtocol`] implements [`UrlProtocol`] for `smb://` URLs by forwarding
//! each call to an SMB client library. One value is one connection context:
//! it owns the library context, the parsed URL and at most one open file or
//! directory handle, and releases them in reverse order of acquisition on
//! close, on every failure path and on drop.

use crate::error::{Errno, Error, Operation, Result};
use crate::library::{Dirent, FileType, OpenMode, SecurityMode, SmbContext, SmbLibrary};
use crate::options::SmbOptions;
use crate::protocol::{AvioFlags, DirEntry, EntryType, ProtocolFlags, ReadOutcome, UrlProtocol, Whence};
use crate::url::{SmbUrl, SMB_SCHEME};
use std::fmt;
use std::io::SeekFrom;
use tracing::{debug, error, warn};

type FileOf<L> = <<L as SmbLibrary>::Context as SmbContext>::File;
type DirOf<L> = <<L as SmbLibrary>::Context as SmbContext>::Dir;

/// Security mode requested on every connection
const SECURITY_MODE: SecurityMode = SecurityMode::SIGNING_ENABLED.union(SecurityMode::SIGNING_REQUIRED);

/// Connection context for one `smb://` resource
pub struct SmbProtocol<L: SmbLibrary> {
    library: L,
    filename: String,
    options: SmbOptions,
    ctx: Option<L::Context>,
    url: Option<SmbUrl>,
    fh: Option<FileOf<L>>,
    dh: Option<DirOf<L>>,
    filesize: Option<u64>,
}

/// Borrow the live library context and parsed URL
fn connection<'a, C>(ctx: &'a mut Option<C>, url: &'a Option<SmbUrl>) -> Result<(&'a mut C, &'a SmbUrl)> {
    match (ctx.as_mut(), url.as_ref()) {
        (Some(ctx), Some(url)) => Ok((ctx, url)),
        _ => Err(Error::NotOpen("connection")),
    }
}

impl<L: SmbLibrary> SmbProtocol<L> {
    /// Create an unconnected context for `filename` with default options
    pub fn new(library: L, filename: impl Into<String>) -> Self {
        Self::with_options(library, filename, SmbOptions::default())
    }

    pub fn with_options(library: L, filename: impl Into<String>, options: SmbOptions) -> Self {
        Self {
            library,
            filename: filename.into(),
            options,
            ctx: None,
            url: None,
            fh: None,
            dh: None,
            filesize: None,
        }
    }

    /// Create a context for `url` and open it as a file
    pub fn open_url(library: L, url: &str, flags: AvioFlags, options: SmbOptions) -> Result<Self> {
        let mut proto = Self::with_options(library, url, options);
        proto.open(flags)?;
        Ok(proto)
    }

    /// True if `url` uses the `smb` scheme
    pub fn accepts(url: &str) -> bool {
        url.split_once(':')
            .map(|(scheme, _)| scheme.eq_ignore_ascii_case(SMB_SCHEME))
            .unwrap_or(false)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn options(&self) -> &SmbOptions {
        &self.options
    }

    /// Options take effect on the next connect
    pub fn options_mut(&mut self) -> &mut SmbOptions {
        &mut self.options
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        self.options.set(name, value)
    }

    /// Parsed URL while connected
    pub fn url(&self) -> Option<&SmbUrl> {
        self.url.as_ref()
    }

    /// Library context while connected
    pub fn context(&self) -> Option<&L::Context> {
        self.ctx.as_ref()
    }

    /// File size learned at open, if the stat succeeded
    pub fn file_size(&self) -> Option<u64> {
        self.filesize
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.ctx.is_some() {
            return Err(Error::AlreadyConnected);
        }
        Ok(())
    }

    /// Create the library context and connect to the share named by the URL
    fn connect(&mut self) -> Result<()> {
        let ctx = self.library.init_context().map_err(|errno| {
            error!("Cannot initialize context: {}", errno);
            Error::ContextInit(errno)
        })?;
        let ctx = self.ctx.insert(ctx);

        let url = ctx.parse_url(&self.filename).map_err(|errno| {
            error!("Parse url failed: {}", errno);
            Error::UrlParse(errno)
        })?;
        let url = self.url.insert(url);

        ctx.set_security_mode(SECURITY_MODE);
        if let Some(timeout) = self.options.timeout() {
            ctx.set_timeout(timeout);
        }
        if let Some(workgroup) = self.options.workgroup() {
            ctx.set_workstation(workgroup);
        }
        if let Some(domain) = &url.domain {
            ctx.set_domain(domain);
        }
        if let Some(password) = &url.password {
            ctx.set_password(password);
        }

        ctx.connect_share(&url.server, &url.share, url.user.as_deref())
            .map_err(|errno| {
                error!("Initialization failed: {}", errno);
                Error::Connect(errno)
            })?;
        debug!("Connected to {}/{}", url.server, url.share);
        Ok(())
    }

    /// Release handles, URL, share connection and library context, in that order
    fn teardown(&mut self) {
        if let Some(fh) = self.fh.take() {
            if let Some(ctx) = self.ctx.as_mut() {
                if let Err(errno) = ctx.close(fh) {
                    debug!("Closing file failed: {}", errno);
                }
            }
        }
        if let Some(dh) = self.dh.take() {
            if let Some(ctx) = self.ctx.as_mut() {
                ctx.closedir(dh);
            }
        }
        self.url = None;
        self.filesize = None;
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(errno) = ctx.disconnect_share() {
                debug!("Disconnect failed: {}", errno);
            }
        }
    }

    /// Connect, run `op`, and tear everything down if either step fails
    fn with_connection<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ensure_idle()?;
        let result = self.connect().and_then(|()| op(self));
        if result.is_err() {
            self.teardown();
        }
        result
    }

    fn open_file(&mut self, flags: AvioFlags) -> Result<()> {
        let mode = OpenMode::for_flags(flags, self.options.truncate);
        let (ctx, url) = connection(&mut self.ctx, &self.url)?;

        let fh = ctx.open(&url.path, mode).map_err(|errno| {
            error!("File open failed: {}", errno);
            Error::Operation {
                op: Operation::Open,
                errno,
            }
        })?;
        self.fh = Some(fh);

        match ctx.stat(&url.path) {
            Ok(st) => self.filesize = Some(st.size),
            Err(errno) => warn!("Cannot stat file: {}", errno),
        }
        Ok(())
    }

    fn file(&mut self) -> Result<(&mut L::Context, &mut FileOf<L>)> {
        match (self.ctx.as_mut(), self.fh.as_mut()) {
            (Some(ctx), Some(fh)) => Ok((ctx, fh)),
            _ => Err(Error::NotOpen("file")),
        }
    }

    fn remove(&mut self) -> Result<()> {
        let (ctx, url) = connection(&mut self.ctx, &self.url)?;

        let fh = ctx.open(&url.path, OpenMode::write_only()).map_err(Error::op(Operation::Open))?;
        self.fh = Some(fh);

        let st = ctx.stat(&url.path).map_err(Error::op(Operation::Stat))?;

        if let Some(fh) = self.fh.take() {
            if let Err(errno) = ctx.close(fh) {
                debug!("Closing file failed: {}", errno);
            }
        }

        if st.file_type == FileType::Directory {
            ctx.rmdir(&url.path).map_err(Error::op(Operation::Rmdir))?;
        } else {
            ctx.unlink(&url.path).map_err(Error::op(Operation::Unlink))?;
        }
        debug!("Deleted {}", url.path);
        Ok(())
    }

    fn rename_to(&mut self, dst: &str) -> Result<()> {
        let (ctx, url) = connection(&mut self.ctx, &self.url)?;

        let dst_url = ctx.parse_url(dst).map_err(|errno| {
            error!("Parse url failed: {}", errno);
            Error::UrlParse(errno)
        })?;
        if !url.same_share(&dst_url) {
            warn!(
                "Destination is on {}/{}, renaming within {}/{}",
                dst_url.server, dst_url.share, url.server, url.share
            );
        }

        ctx.rename(&url.path, &dst_url.path).map_err(Error::op(Operation::Rename))?;
        debug!("Renamed {} -> {}", url.path, dst_url.path);
        Ok(())
    }
}

fn reserve_name(name: &mut String, len: usize) -> Result<()> {
    name.try_reserve_exact(len).map_err(|_| {
        error!("Cannot allocate {} bytes for a directory entry name", len);
        Error::OutOfMemory
    })
}

/// Copy a library entry into a listing entry
fn dir_entry(dirent: &Dirent) -> Result<DirEntry> {
    let mut name = String::new();
    reserve_name(&mut name, dirent.name.len())?;
    name.push_str(&dirent.name);

    let entry_type = match dirent.stat.file_type {
        FileType::Directory => EntryType::Directory,
        FileType::File => EntryType::File,
        FileType::Link => EntryType::Unknown,
    };

    let st = &dirent.stat;
    let mut entry = DirEntry::new(name, entry_type);
    entry.size = i64::try_from(st.size).unwrap_or(i64::MAX);
    entry.modification_timestamp = st.mtime.saturating_mul(1_000_000);
    entry.access_timestamp = st.atime.saturating_mul(1_000_000);
    entry.status_change_timestamp = st.ctime.saturating_mul(1_000_000);
    Ok(entry)
}

impl<L: SmbLibrary> UrlProtocol for SmbProtocol<L> {
    fn name(&self) -> &'static str {
        SMB_SCHEME
    }

    fn flags(&self) -> ProtocolFlags {
        ProtocolFlags::NETWORK
    }

    fn open(&mut self, flags: AvioFlags) -> Result<()> {
        self.with_connection(|this| this.open_file(flags))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        let (ctx, fh) = self.file()?;
        match ctx.read(fh, buf) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => Ok(ReadOutcome::Data(n)),
            Err(errno) => {
                error!("Read error: {}", errno);
                Err(Error::Operation {
                    op: Operation::Read,
                    errno,
                })
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let (ctx, fh) = self.file()?;
        ctx.write(fh, buf).map_err(|errno| {
            error!("Write error: {}", errno);
            Error::Operation {
                op: Operation::Write,
                errno,
            }
        })
    }

    fn seek(&mut self, pos: i64, whence: Whence) -> Result<i64> {
        let target = match whence {
            Whence::Size => {
                return match self.filesize {
                    Some(size) => Ok(i64::try_from(size).unwrap_or(i64::MAX)),
                    None => {
                        error!("Error during seeking: filesize is unknown.");
                        Err(Error::SizeUnknown)
                    }
                };
            }
            Whence::Set => match u64::try_from(pos) {
                Ok(pos) => SeekFrom::Start(pos),
                Err(_) => {
                    error!("Error during seeking: negative offset {}", pos);
                    return Err(Error::Operation {
                        op: Operation::Seek,
                        errno: Errno::EINVAL,
                    });
                }
            },
            Whence::Cur => SeekFrom::Current(pos),
            Whence::End => SeekFrom::End(pos),
        };

        let (ctx, fh) = self.file()?;
        let newpos = ctx.lseek(fh, target).map_err(|errno| {
            error!("Error during seeking: {}", errno);
            Error::Operation {
                op: Operation::Seek,
                errno,
            }
        })?;
        i64::try_from(newpos).map_err(|_| Error::Operation {
            op: Operation::Seek,
            errno: Errno::EINVAL,
        })
    }

    fn close(&mut self) -> Result<()> {
        self.teardown();
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let result = self.connect().and_then(|()| self.remove());
        self.teardown();
        result
    }

    fn move_to(&mut self, dst: &str) -> Result<()> {
        self.ensure_idle()?;
        let result = self.connect().and_then(|()| self.rename_to(dst));
        self.teardown();
        result
    }

    fn open_dir(&mut self) -> Result<()> {
        self.with_connection(|this| {
            let (ctx, url) = connection(&mut this.ctx, &this.url)?;
            let dh = ctx.opendir(&url.path).map_err(|errno| {
                error!("Error opening dir: {}", errno);
                Error::Operation {
                    op: Operation::OpenDir,
                    errno,
                }
            })?;
            this.dh = Some(dh);
            Ok(())
        })
    }

    fn read_dir(&mut self) -> Result<Option<DirEntry>> {
        let (ctx, dh) = match (self.ctx.as_mut(), self.dh.as_mut()) {
            (Some(ctx), Some(dh)) => (ctx, dh),
            _ => return Err(Error::NotOpen("directory")),
        };

        loop {
            let dirent = match ctx.readdir(dh) {
                Ok(Some(dirent)) => dirent,
                Ok(None) => return Ok(None),
                Err(errno) => {
                    error!("Error reading dir: {}", errno);
                    return Err(Error::Operation {
                        op: Operation::ReadDir,
                        errno,
                    });
                }
            };
            if dirent.name == "." || dirent.name == ".." {
                continue;
            }
            return dir_entry(dirent).map(Some);
        }
    }

    fn close_dir(&mut self) -> Result<()> {
        self.teardown();
        Ok(())
    }
}

impl<L: SmbLibrary> Drop for SmbProtocol<L> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<L: SmbLibrary> fmt::Debug for SmbProtocol<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbProtocol")
            .field("url", &self.url)
            .field("options", &self.options)
            .field("connected", &self.ctx.is_some())
            .field("file_open", &self.fh.is_some())
            .field("dir_open", &self.dh.is_some())
            .field("filesize", &self.filesize)
            .finish()
    }
}
