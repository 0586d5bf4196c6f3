//! Local-directory SMB library
//!
//! Serves `server/share` pairs from directories on the local filesystem. It
//! behaves like a client library talking to a loopback server: the same open,
//! stat and listing semantics, with error codes taken straight from the OS.

use super::{unix_seconds, Dirent, FileType, LibResult, OpenMode, SecurityMode, SmbContext, SmbLibrary, Stat};
use crate::error::Errno;
use crate::url::split_port;
use std::collections::HashMap;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// A directory exported as a share
#[derive(Debug, Clone)]
pub struct LocalShare {
    /// Directory served as the share root
    pub root: PathBuf,
    /// User name and password required to connect, if any
    pub credentials: Option<(String, String)>,
    /// Refuse every modification
    pub read_only: bool,
}

impl LocalShare {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            credentials: None,
            read_only: false,
        }
    }

    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.credentials = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Library serving shares from local directories
#[derive(Debug, Clone, Default)]
pub struct LocalLibrary {
    shares: Arc<HashMap<(String, String), LocalShare>>,
}

impl LocalLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `share` on `server`; names are matched case-insensitively
    pub fn with_share(mut self, server: &str, share: &str, local: LocalShare) -> Self {
        Arc::make_mut(&mut self.shares).insert(share_key(server, share), local);
        self
    }
}

fn share_key(server: &str, share: &str) -> (String, String) {
    (
        split_port(server).0.to_ascii_lowercase(),
        share.to_ascii_lowercase(),
    )
}

impl SmbLibrary for LocalLibrary {
    type Context = LocalContext;

    fn init_context(&self) -> LibResult<LocalContext> {
        Ok(LocalContext {
            shares: Arc::clone(&self.shares),
            connected: None,
            security_mode: SecurityMode::empty(),
            timeout: None,
            workstation: None,
            domain: None,
            password: None,
        })
    }
}

#[derive(Debug)]
struct Connected {
    root: PathBuf,
    read_only: bool,
}

/// Context handed out by [`LocalLibrary`]
#[derive(Debug)]
pub struct LocalContext {
    shares: Arc<HashMap<(String, String), LocalShare>>,
    connected: Option<Connected>,
    security_mode: SecurityMode,
    timeout: Option<Duration>,
    workstation: Option<String>,
    domain: Option<String>,
    password: Option<String>,
}

/// Open handle of a [`LocalContext`]
#[derive(Debug)]
pub enum LocalFile {
    File(File),
    /// Directories can be opened for stat/delete but carry no data
    Directory(PathBuf),
}

/// Open directory listing of a [`LocalContext`]
#[derive(Debug)]
pub struct LocalDir {
    entries: Vec<Dirent>,
    pos: usize,
}

impl LocalContext {
    pub fn security_mode(&self) -> SecurityMode {
        self.security_mode
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn workstation(&self) -> Option<&str> {
        self.workstation.as_deref()
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.is_some()
    }

    fn share(&self) -> LibResult<&Connected> {
        self.connected.as_ref().ok_or(Errno::ENOTCONN)
    }

    fn writable_share(&self) -> LibResult<&Connected> {
        let share = self.share()?;
        if share.read_only {
            return Err(Errno::EACCES);
        }
        Ok(share)
    }

    /// Map a share path onto the local tree without leaving the share root
    fn resolve(&self, path: &str) -> LibResult<PathBuf> {
        let root = &self.share()?.root;
        let mut full_path = root.clone();
        for component in path.split(|c: char| c == '/' || c == '\\') {
            match component {
                "" | "." => continue,
                ".." => return Err(Errno::EACCES),
                c => full_path.push(c),
            }
        }

        // The deepest existing ancestor decides where a new path would land
        let mut existing = full_path.as_path();
        loop {
            if fs::symlink_metadata(existing).is_ok() {
                let canonical = existing.canonicalize().map_err(|_| Errno::EACCES)?;
                if !canonical.starts_with(root) {
                    debug!("Path {:?} resolves outside the share", full_path);
                    return Err(Errno::EACCES);
                }
                break;
            }
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return Err(Errno::EACCES),
            }
        }
        Ok(full_path)
    }
}

fn seconds(time: std::io::Result<SystemTime>) -> i64 {
    time.map(unix_seconds).unwrap_or(0)
}

fn to_stat(metadata: &Metadata) -> Stat {
    let file_type = if metadata.file_type().is_symlink() {
        FileType::Link
    } else if metadata.is_dir() {
        FileType::Directory
    } else {
        FileType::File
    };

    #[cfg(unix)]
    let (ino, nlink, ctime) = {
        use std::os::unix::fs::MetadataExt;
        (
            metadata.ino(),
            u32::try_from(metadata.nlink()).unwrap_or(u32::MAX),
            metadata.ctime(),
        )
    };
    #[cfg(not(unix))]
    let (ino, nlink, ctime) = (0, 1, seconds(metadata.modified()));

    Stat {
        file_type,
        ino,
        nlink,
        size: metadata.len(),
        atime: seconds(metadata.accessed()),
        mtime: seconds(metadata.modified()),
        ctime,
        btime: seconds(metadata.created()),
    }
}

/// Stat through symlinks, as opening does
fn stat_path(path: &Path) -> LibResult<Stat> {
    let metadata = fs::metadata(path)?;
    Ok(to_stat(&metadata))
}

impl SmbContext for LocalContext {
    type File = LocalFile;
    type Dir = LocalDir;

    fn set_security_mode(&mut self, mode: SecurityMode) {
        self.security_mode = mode;
    }

    fn set_timeout(&mut self, timeout: Duration) {
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
        if self.connected.is_some() {
            return Err(Errno::EISCONN);
        }

        let (host, share_name) = share_key(server, share);
        let local = match self.shares.get(&(host.clone(), share_name)) {
            Some(local) => local,
            None if self.shares.keys().any(|(h, _)| *h == host) => return Err(Errno::ENOENT),
            None => return Err(Errno::ECONNREFUSED),
        };

        if let Some((want_user, want_password)) = &local.credentials {
            if user != Some(want_user.as_str()) || self.password.as_deref() != Some(want_password.as_str()) {
                debug!("Logon failure for {:?} on {}/{}", user, server, share);
                return Err(Errno::EACCES);
            }
        }

        let root = local.root.canonicalize()?;
        if !root.is_dir() {
            return Err(Errno::ENOTDIR);
        }

        debug!("Connected {}/{} -> {:?}", server, share, root);
        self.connected = Some(Connected {
            root,
            read_only: local.read_only,
        });
        Ok(())
    }

    fn disconnect_share(&mut self) -> LibResult<()> {
        self.connected.take().map(|_| ()).ok_or(Errno::ENOTCONN)
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> LibResult<LocalFile> {
        let full_path = self.resolve(path)?;
        if mode.writable() || mode.create {
            self.writable_share()?;
        }

        if full_path.is_dir() {
            if mode.truncate {
                return Err(Errno::EISDIR);
            }
            return Ok(LocalFile::Directory(full_path));
        }

        let file = OpenOptions::new()
            .read(mode.readable())
            .write(mode.writable())
            .create(mode.create)
            .truncate(mode.truncate)
            .open(&full_path)?;
        debug!("Opened {:?} with {:?}", full_path, mode);
        Ok(LocalFile::File(file))
    }

    fn close(&mut self, file: LocalFile) -> LibResult<()> {
        if let LocalFile::File(mut file) = file {
            file.flush()?;
        }
        Ok(())
    }

    fn stat(&mut self, path: &str) -> LibResult<Stat> {
        let full_path = self.resolve(path)?;
        stat_path(&full_path)
    }

    fn read(&mut self, file: &mut LocalFile, buf: &mut [u8]) -> LibResult<usize> {
        match file {
            LocalFile::File(file) => Ok(file.read(buf)?),
            LocalFile::Directory(_) => Err(Errno::EISDIR),
        }
    }

    fn write(&mut self, file: &mut LocalFile, buf: &[u8]) -> LibResult<usize> {
        match file {
            LocalFile::File(file) => Ok(file.write(buf)?),
            LocalFile::Directory(_) => Err(Errno::EISDIR),
        }
    }

    fn lseek(&mut self, file: &mut LocalFile, pos: SeekFrom) -> LibResult<u64> {
        match file {
            LocalFile::File(file) => Ok(file.seek(pos)?),
            LocalFile::Directory(_) => Err(Errno::EISDIR),
        }
    }

    fn opendir(&mut self, path: &str) -> LibResult<LocalDir> {
        let full_path = self.resolve(path)?;
        let root = &self.share()?.root;

        let own = stat_path(&full_path)?;
        let up = match full_path.parent() {
            Some(parent) if full_path != *root => stat_path(parent)?,
            _ => own,
        };

        let mut children = Vec::new();
        for entry in fs::read_dir(&full_path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            children.push(Dirent {
                name: entry.file_name().to_string_lossy().into_owned(),
                stat: to_stat(&metadata),
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Listed {} entries in directory {}", children.len(), path);

        let mut entries = vec![
            Dirent {
                name: ".".to_string(),
                stat: own,
            },
            Dirent {
                name: "..".to_string(),
                stat: up,
            },
        ];
        entries.extend(children);
        Ok(LocalDir { entries, pos: 0 })
    }

    fn readdir<'d>(&mut self, dir: &'d mut LocalDir) -> LibResult<Option<&'d Dirent>> {
        let idx = dir.pos;
        if idx < dir.entries.len() {
            dir.pos += 1;
        }
        Ok(dir.entries.get(idx))
    }

    fn closedir(&mut self, _dir: LocalDir) {}

    fn rmdir(&mut self, path: &str) -> LibResult<()> {
        self.writable_share()?;
        let full_path = self.resolve(path)?;
        if full_path == self.share()?.root {
            return Err(Errno::EACCES);
        }
        fs::remove_dir(&full_path)?;
        debug!("Deleted directory: {:?}", full_path);
        Ok(())
    }

    fn unlink(&mut self, path: &str) -> LibResult<()> {
        self.writable_share()?;
        let full_path = self.resolve(path)?;
        if full_path.is_dir() {
            return Err(Errno::EISDIR);
        }
        fs::remove_file(&full_path)?;
        debug!("Deleted file: {:?}", full_path);
        Ok(())
    }

    fn rename(&mut self, old_path: &str, new_path: &str) -> LibResult<()> {
        self.writable_share()?;
        let old_full = self.resolve(old_path)?;
        let new_full = self.resolve(new_path)?;
        fs::rename(&old_full, &new_full)?;
        debug!("Renamed: {:?} -> {:?}", old_full, new_full);
        Ok(())
    }
}
