//! libsmbclient-backed SMB library
//!
//! Talks to real SMB/CIFS servers through `pavao`. `pavao` file handles
//! borrow their client, so an open file here is a path, an access mode and an
//! offset; each read or write opens the remote file, positions it and
//! transfers one buffer.

use super::{unix_seconds, Dirent, FileType, LibResult, OpenMode, SecurityMode, SmbContext, SmbLibrary, Stat};
use crate::error::Errno;
use pavao::{SmbClient, SmbCredentials, SmbDirentType, SmbOpenOptions, SmbOptions as ClientOptions, SmbStat};
use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::Duration;
use tracing::{debug, warn};

/// Library that connects through libsmbclient
#[derive(Debug, Clone, Default)]
pub struct SmbClientLibrary {
    case_sensitive: bool,
}

impl SmbClientLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat remote paths as case sensitive
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}

impl SmbLibrary for SmbClientLibrary {
    type Context = SmbClientContext;

    fn init_context(&self) -> LibResult<SmbClientContext> {
        Ok(SmbClientContext {
            case_sensitive: self.case_sensitive,
            client: None,
            security_mode: SecurityMode::empty(),
            timeout: None,
            workstation: None,
            domain: None,
            password: None,
        })
    }
}

/// Context handed out by [`SmbClientLibrary`]
pub struct SmbClientContext {
    case_sensitive: bool,
    client: Option<SmbClient>,
    security_mode: SecurityMode,
    timeout: Option<Duration>,
    workstation: Option<String>,
    domain: Option<String>,
    password: Option<String>,
}

impl fmt::Debug for SmbClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbClientContext")
            .field("connected", &self.client.is_some())
            .field("security_mode", &self.security_mode)
            .field("timeout", &self.timeout)
            .field("workstation", &self.workstation)
            .field("domain", &self.domain)
            .finish()
    }
}

/// Open file of a [`SmbClientContext`]
#[derive(Debug)]
pub struct SmbClientFile {
    path: String,
    mode: OpenMode,
    pos: u64,
    is_dir: bool,
}

/// Directory listing of a [`SmbClientContext`]
#[derive(Debug)]
pub struct SmbClientDir {
    entries: Vec<Dirent>,
    pos: usize,
}

/// Errno carried by a client error, found on its `io::Error` source if any
fn errno_of(err: &(dyn StdError + 'static)) -> Errno {
    let mut source = Some(err);
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            return Errno::from_io(io_err);
        }
        source = err.source();
    }
    Errno::EIO
}

fn lib_err(err: pavao::SmbError) -> Errno {
    let errno = errno_of(&err);
    debug!("libsmbclient error: {} ({})", err, errno);
    errno
}

/// Share-relative path in the form libsmbclient expects
fn remote_path(path: &str) -> String {
    format!("/{}", path.trim_matches('/'))
}

fn to_stat(stat: &SmbStat) -> Stat {
    let file_type = if stat.mode.is_dir() {
        FileType::Directory
    } else if stat.mode.is_symlink() {
        FileType::Link
    } else {
        FileType::File
    };
    Stat {
        file_type,
        ino: 0,
        nlink: 1,
        size: stat.size,
        atime: unix_seconds(stat.accessed),
        mtime: unix_seconds(stat.modified),
        ctime: unix_seconds(stat.modified),
        btime: unix_seconds(stat.created),
    }
}

impl SmbClientContext {
    pub fn security_mode(&self) -> SecurityMode {
        self.security_mode
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn client(&self) -> LibResult<&SmbClient> {
        self.client.as_ref().ok_or(Errno::ENOTCONN)
    }

    fn stat_remote(&self, path: &str) -> LibResult<Stat> {
        let stat = self.client()?.stat(remote_path(path)).map_err(lib_err)?;
        Ok(to_stat(&stat))
    }

    /// Open the remote file for one transfer, positioned at `file.pos`
    fn reopen(&self, file: &SmbClientFile, write: bool) -> LibResult<pavao::SmbFile<'_>> {
        let options = SmbOpenOptions::default().read(!write).write(write);
        let mut remote = self
            .client()?
            .open_with(&file.path, options)
            .map_err(lib_err)?;
        remote.seek(SeekFrom::Start(file.pos))?;
        Ok(remote)
    }
}

impl SmbContext for SmbClientContext {
    type File = SmbClientFile;
    type Dir = SmbClientDir;

    fn set_security_mode(&mut self, mode: SecurityMode) {
        // libsmbclient takes signing policy from smb.conf ("client signing")
        debug!("Security mode {:?} left to smb.conf", mode);
        self.security_mode = mode;
    }

    fn set_timeout(&mut self, timeout: Duration) {
        debug!("Timeout {:?} left to smb.conf", timeout);
        self.timeout = Some(timeout);
    }

    fn set_workstation(&mut self, workstation: &str) {
        self.workstation = Some(workstation.to_string());
    }

    fn set_domain(&mut self, domain: &str) {
        self.domain = Some(domain.to_string());
    }

    fn set_password(&mut self, password: &str) {
        self.password = Some(password.to_string());
    }

    fn connect_share(&mut self, server: &str, share: &str, user: Option<&str>) -> LibResult<()> {
        if self.client.is_some() {
            return Err(Errno::EISCONN);
        }

        let mut credentials = SmbCredentials::default()
            .server(format!("smb://{}", server))
            .share(format!("/{}", share));
        if let Some(user) = user {
            credentials = credentials.username(user);
        }
        if let Some(password) = &self.password {
            credentials = credentials.password(password);
        }
        // libsmbclient authenticates against one workgroup, the domain when given
        if let Some(workgroup) = self.domain.as_ref().or(self.workstation.as_ref()) {
            credentials = credentials.workgroup(workgroup);
        }

        let options = ClientOptions::default()
            .case_sensitive(self.case_sensitive)
            .one_share_per_server(true);
        let client = SmbClient::new(credentials, options).map_err(lib_err)?;

        // libsmbclient connects lazily; touch the share root to surface failures now
        client.stat("/").map_err(lib_err)?;

        debug!("Connected to {}/{}", server, share);
        self.client = Some(client);
        Ok(())
    }

    fn disconnect_share(&mut self) -> LibResult<()> {
        self.client.take().map(|_| ()).ok_or(Errno::ENOTCONN)
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> LibResult<SmbClientFile> {
        let path = remote_path(path);
        let client = self.client()?;

        if let Ok(stat) = client.stat(&path) {
            if stat.mode.is_dir() {
                if mode.truncate {
                    return Err(Errno::EISDIR);
                }
                return Ok(SmbClientFile {
                    path,
                    mode,
                    pos: 0,
                    is_dir: true,
                });
            }
        }

        let options = SmbOpenOptions::default()
            .read(mode.readable())
            .write(mode.writable())
            .create(mode.create)
            .truncate(mode.truncate);
        let remote = client.open_with(&path, options).map_err(lib_err)?;
        drop(remote);

        debug!("Opened {} with {:?}", path, mode);
        Ok(SmbClientFile {
            path,
            mode,
            pos: 0,
            is_dir: false,
        })
    }

    fn close(&mut self, _file: SmbClientFile) -> LibResult<()> {
        Ok(())
    }

    fn stat(&mut self, path: &str) -> LibResult<Stat> {
        self.stat_remote(path)
    }

    fn read(&mut self, file: &mut SmbClientFile, buf: &mut [u8]) -> LibResult<usize> {
        if file.is_dir {
            return Err(Errno::EISDIR);
        }
        if !file.mode.readable() {
            return Err(Errno::EBADF);
        }
        let mut remote = self.reopen(file, false)?;
        let n = remote.read(buf)?;
        file.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, file: &mut SmbClientFile, buf: &[u8]) -> LibResult<usize> {
        if file.is_dir {
            return Err(Errno::EISDIR);
        }
        if !file.mode.writable() {
            return Err(Errno::EBADF);
        }
        let mut remote = self.reopen(file, true)?;
        let n = remote.write(buf)?;
        remote.flush()?;
        file.pos += n as u64;
        Ok(n)
    }

    fn lseek(&mut self, file: &mut SmbClientFile, pos: SeekFrom) -> LibResult<u64> {
        if file.is_dir {
            return Err(Errno::EISDIR);
        }
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(n) => file.pos.checked_add_signed(n),
            SeekFrom::End(n) => {
                let size = self.stat_remote(&file.path)?.size;
                size.checked_add_signed(n)
            }
        };
        file.pos = target.ok_or(Errno::EINVAL)?;
        Ok(file.pos)
    }

    fn opendir(&mut self, path: &str) -> LibResult<SmbClientDir> {
        let dir_path = remote_path(path);
        let client = self.client()?;

        let own = to_stat(&client.stat(&dir_path).map_err(lib_err)?);
        if own.file_type != FileType::Directory {
            return Err(Errno::ENOTDIR);
        }

        let mut entries = Vec::new();
        for dirent in client.list_dir(&dir_path).map_err(lib_err)? {
            let file_type = match dirent.get_type() {
                SmbDirentType::Dir => FileType::Directory,
                SmbDirentType::File => FileType::File,
                SmbDirentType::Link => FileType::Link,
                _ => continue,
            };
            let name = dirent.name().to_string();
            let child = format!("{}/{}", dir_path.trim_end_matches('/'), name);
            let stat = match client.stat(&child) {
                Ok(stat) => Stat {
                    file_type,
                    ..to_stat(&stat)
                },
                Err(err) => {
                    warn!("Cannot stat {}: {}", child, err);
                    Stat {
                        file_type,
                        ino: 0,
                        nlink: 1,
                        size: 0,
                        atime: 0,
                        mtime: 0,
                        ctime: 0,
                        btime: 0,
                    }
                }
            };
            entries.push(Dirent { name, stat });
        }
        debug!("Listed {} entries in directory {}", entries.len(), dir_path);

        Ok(SmbClientDir { entries, pos: 0 })
    }

    fn readdir<'d>(&mut self, dir: &'d mut SmbClientDir) -> LibResult<Option<&'d Dirent>> {
        self.client()?;
        let idx = dir.pos;
        if idx < dir.entries.len() {
            dir.pos += 1;
        }
        Ok(dir.entries.get(idx))
    }

    fn closedir(&mut self, _dir: SmbClientDir) {}

    fn rmdir(&mut self, path: &str) -> LibResult<()> {
        self.client()?.rmdir(remote_path(path)).map_err(lib_err)
    }

    fn unlink(&mut self, path: &str) -> LibResult<()> {
        self.client()?.unlink(remote_path(path)).map_err(lib_err)
    }

    fn rename(&mut self, old_path: &str, new_path: &str) -> LibResult<()> {
        self.client()?
            .rename(remote_path(old_path), remote_path(new_path))
            .map_err(lib_err)
    }
}
