//! In-memory SMB library for testing
//!
//! Serves a single share from a map of paths, records every library call in a
//! journal and can be told to fail a given call with a chosen error code.

use super::{Dirent, FileType, LibResult, OpenMode, SecurityMode, SmbContext, SmbLibrary, Stat};
use crate::error::Errno;
use std::collections::{BTreeMap, HashMap};
use std::io::SeekFrom;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Library call recorded in the journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InitContext,
    ParseUrl(String),
    SetSecurityMode(SecurityMode),
    SetTimeout(Duration),
    SetWorkstation(String),
    SetDomain(String),
    SetPassword(String),
    ConnectShare {
        server: String,
        share: String,
        user: Option<String>,
    },
    DisconnectShare,
    Open(String, OpenMode),
    Close(String),
    Stat(String),
    Read(usize),
    Write(usize),
    Lseek(SeekFrom),
    Opendir(String),
    Readdir,
    Closedir(String),
    Rmdir(String),
    Unlink(String),
    Rename(String, String),
    DestroyContext,
}

/// Library call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    InitContext,
    ParseUrl,
    ConnectShare,
    Open,
    Stat,
    Read,
    Write,
    Lseek,
    Opendir,
    Readdir,
    Rmdir,
    Unlink,
    Rename,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Directory,
    File(Vec<u8>),
    Link,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    ino: u64,
    mtime: i64,
}

#[derive(Debug)]
struct MemoryState {
    server: String,
    share: String,
    credentials: Option<(String, String)>,
    nodes: BTreeMap<String, Node>,
    clock: i64,
    next_ino: u64,
    calls: Vec<Call>,
    faults: HashMap<Fault, Errno>,
    live_contexts: usize,
}

impl MemoryState {
    fn record(&mut self, call: Call) {
        self.calls.push(call);
    }

    fn check(&self, fault: Fault) -> LibResult<()> {
        match self.faults.get(&fault) {
            Some(errno) => Err(*errno),
            None => Ok(()),
        }
    }

    fn insert(&mut self, path: &str, kind: NodeKind) {
        self.clock += 1;
        self.next_ino += 1;
        let node = Node {
            kind,
            ino: self.next_ino,
            mtime: self.clock,
        };
        self.nodes.insert(normalize(path), node);
    }

    fn stat_node(node: &Node) -> Stat {
        let (file_type, size) = match &node.kind {
            NodeKind::Directory => (FileType::Directory, 0),
            NodeKind::File(data) => (FileType::File, data.len() as u64),
            NodeKind::Link => (FileType::Link, 0),
        };
        Stat {
            file_type,
            ino: node.ino,
            nlink: 1,
            size,
            atime: node.mtime,
            mtime: node.mtime,
            ctime: node.mtime,
            btime: node.mtime,
        }
    }

    fn has_children(&self, path: &str) -> bool {
        self.nodes.keys().any(|k| parent(k) == Some(path))
    }

    fn parent_is_dir(&self, path: &str) -> bool {
        match parent(path) {
            Some(p) => matches!(self.nodes.get(p).map(|n| &n.kind), Some(NodeKind::Directory)),
            None => false,
        }
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map(|(p, _)| p).unwrap_or(""))
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, n)| n).unwrap_or(path)
}

/// In-memory library serving one share
#[derive(Debug, Clone)]
pub struct MemoryLibrary {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLibrary {
    /// Create a library serving an empty `share` on `server`
    pub fn new(server: &str, share: &str) -> Self {
        let mut state = MemoryState {
            server: server.to_string(),
            share: share.to_string(),
            credentials: None,
            nodes: BTreeMap::new(),
            clock: 0,
            next_ino: 0,
            calls: Vec::new(),
            faults: HashMap::new(),
            live_contexts: 0,
        };
        state.insert("", NodeKind::Directory);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test thread must not hide the journal from others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Require this user name and password on connect
    pub fn with_credentials(self, user: &str, password: &str) -> Self {
        self.lock().credentials = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.lock().insert(path, NodeKind::File(data.to_vec()));
    }

    pub fn add_dir(&self, path: &str) {
        self.lock().insert(path, NodeKind::Directory);
    }

    pub fn add_link(&self, path: &str) {
        self.lock().insert(path, NodeKind::Link);
    }

    /// Contents of a file, `None` if it is missing or not a file
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.lock().nodes.get(&normalize(path)).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().nodes.contains_key(&normalize(path))
    }

    /// Make every later call of this kind fail with `errno`
    pub fn fail(&self, fault: Fault, errno: Errno) {
        self.lock().faults.insert(fault, errno);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Journal of library calls so far
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Contexts created and not yet destroyed
    pub fn live_contexts(&self) -> usize {
        self.lock().live_contexts
    }
}

impl SmbLibrary for MemoryLibrary {
    type Context = MemoryContext;

    fn init_context(&self) -> LibResult<MemoryContext> {
        let mut state = self.lock();
        state.record(Call::InitContext);
        state.check(Fault::InitContext)?;
        state.live_contexts += 1;
        drop(state);

        Ok(MemoryContext {
            library: self.clone(),
            connected: false,
            password: None,
        })
    }
}

/// Context handed out by [`MemoryLibrary`]
#[derive(Debug)]
pub struct MemoryContext {
    library: MemoryLibrary,
    connected: bool,
    password: Option<String>,
}

/// Open file of a [`MemoryContext`]
#[derive(Debug)]
pub struct MemoryFile {
    path: String,
    pos: u64,
    mode: OpenMode,
}

/// Open directory of a [`MemoryContext`]
#[derive(Debug)]
pub struct MemoryDir {
    path: String,
    entries: Vec<Dirent>,
    pos: usize,
}

impl MemoryContext {
    /// Lock the shared state for an operation that needs a connected share
    fn session(&self) -> LibResult<MutexGuard<'_, MemoryState>> {
        if !self.connected {
            return Err(Errno::ENOTCONN);
        }
        Ok(self.library.lock())
    }
}

impl Drop for MemoryContext {
    fn drop(&mut self) {
        let mut state = self.library.lock();
        state.record(Call::DestroyContext);
        state.live_contexts = state.live_contexts.saturating_sub(1);
    }
}

impl SmbContext for MemoryContext {
    type File = MemoryFile;
    type Dir = MemoryDir;

    fn parse_url(&mut self, url: &str) -> LibResult<crate::url::SmbUrl> {
        {
            let mut state = self.library.lock();
            state.record(Call::ParseUrl(url.to_string()));
            state.check(Fault::ParseUrl)?;
        }
        crate::url::SmbUrl::parse(url).map_err(Errno::from)
    }

    fn set_security_mode(&mut self, mode: SecurityMode) {
        self.library.lock().record(Call::SetSecurityMode(mode));
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.library.lock().record(Call::SetTimeout(timeout));
    }

    fn set_workstation(&mut self, workstation: &str) {
        self.library.lock().record(Call::SetWorkstation(workstation.to_string()));
    }

    fn set_domain(&mut self, domain: &str) {
        self.library.lock().record(Call::SetDomain(domain.to_string()));
    }

    fn set_password(&mut self, password: &str) {
        self.library.lock().record(Call::SetPassword(password.to_string()));
        self.password = Some(password.to_string());
    }

    fn connect_share(&mut self, server: &str, share: &str, user: Option<&str>) -> LibResult<()> {
        let state = {
            let mut state = self.library.lock();
            state.record(Call::ConnectShare {
                server: server.to_string(),
                share: share.to_string(),
                user: user.map(str::to_string),
            });
            state.check(Fault::ConnectShare)?;
            state
        };

        let host = crate::url::split_port(server).0;
        if !host.eq_ignore_ascii_case(&state.server) {
            return Err(Errno::ECONNREFUSED);
        }
        if !share.eq_ignore_ascii_case(&state.share) {
            return Err(Errno::ENOENT);
        }
        if let Some((want_user, want_password)) = &state.credentials {
            if user != Some(want_user.as_str()) || self.password.as_deref() != Some(want_password.as_str()) {
                return Err(Errno::EACCES);
            }
        }
        drop(state);

        self.connected = true;
        Ok(())
    }

    fn disconnect_share(&mut self) -> LibResult<()> {
        self.library.lock().record(Call::DisconnectShare);
        if !self.connected {
            return Err(Errno::ENOTCONN);
        }
        self.connected = false;
        Ok(())
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> LibResult<MemoryFile> {
        let mut state = self.session()?;
        state.record(Call::Open(path.to_string(), mode));
        state.check(Fault::Open)?;

        let key = normalize(path);
        if !state.nodes.contains_key(&key) {
            if !mode.create || !state.parent_is_dir(&key) {
                return Err(Errno::ENOENT);
            }
            state.insert(&key, NodeKind::File(Vec::new()));
        }

        let node = state.nodes.get_mut(&key).ok_or(Errno::ENOENT)?;
        match &mut node.kind {
            NodeKind::Directory if mode.truncate => return Err(Errno::EISDIR),
            NodeKind::Directory => {}
            NodeKind::File(data) => {
                if mode.truncate && mode.writable() {
                    data.clear();
                }
            }
            NodeKind::Link => return Err(Errno::EACCES),
        }

        Ok(MemoryFile { path: key, pos: 0, mode })
    }

    fn close(&mut self, file: MemoryFile) -> LibResult<()> {
        self.library.lock().record(Call::Close(file.path));
        Ok(())
    }

    fn stat(&mut self, path: &str) -> LibResult<Stat> {
        let mut state = self.session()?;
        state.record(Call::Stat(path.to_string()));
        state.check(Fault::Stat)?;
        let stat = state
            .nodes
            .get(&normalize(path))
            .map(MemoryState::stat_node)
            .ok_or(Errno::ENOENT);
        stat
    }

    fn read(&mut self, file: &mut MemoryFile, buf: &mut [u8]) -> LibResult<usize> {
        let mut state = self.session()?;
        state.record(Call::Read(buf.len()));
        state.check(Fault::Read)?;
        if !file.mode.readable() {
            return Err(Errno::EBADF);
        }
        let data = match state.nodes.get(&file.path).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => data,
            Some(_) => return Err(Errno::EISDIR),
            None => return Err(Errno::ENOENT),
        };
        let start = usize::try_from(file.pos).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        file.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, file: &mut MemoryFile, buf: &[u8]) -> LibResult<usize> {
        let mut state = self.session()?;
        state.record(Call::Write(buf.len()));
        state.check(Fault::Write)?;
        if !file.mode.writable() {
            return Err(Errno::EBADF);
        }
        state.clock += 1;
        let now = state.clock;
        let node = state.nodes.get_mut(&file.path).ok_or(Errno::ENOENT)?;
        let data = match &mut node.kind {
            NodeKind::File(data) => data,
            _ => return Err(Errno::EISDIR),
        };
        let start = usize::try_from(file.pos).map_err(|_| Errno::EFBIG)?;
        let end = start
            .checked_add(buf.len())
            .filter(|end| isize::try_from(*end).is_ok())
            .ok_or(Errno::EFBIG)?;
        if data.len() < end {
            data.try_reserve(end - data.len()).map_err(|_| Errno::ENOMEM)?;
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        node.mtime = now;
        file.pos = end as u64;
        Ok(buf.len())
    }

    fn lseek(&mut self, file: &mut MemoryFile, pos: SeekFrom) -> LibResult<u64> {
        let mut state = self.session()?;
        state.record(Call::Lseek(pos));
        state.check(Fault::Lseek)?;
        let size = match state.nodes.get(&file.path).map(|n| &n.kind) {
            Some(NodeKind::File(data)) => data.len() as i64,
            Some(_) => 0,
            None => return Err(Errno::ENOENT),
        };
        let target = match pos {
            SeekFrom::Start(n) => i64::try_from(n).map_err(|_| Errno::EINVAL)?,
            SeekFrom::Current(n) => i64::try_from(file.pos)
                .ok()
                .and_then(|pos| pos.checked_add(n))
                .ok_or(Errno::EINVAL)?,
            SeekFrom::End(n) => size.checked_add(n).ok_or(Errno::EINVAL)?,
        };
        if target < 0 {
            return Err(Errno::EINVAL);
        }
        file.pos = target as u64;
        Ok(file.pos)
    }

    fn opendir(&mut self, path: &str) -> LibResult<MemoryDir> {
        let mut state = self.session()?;
        state.record(Call::Opendir(path.to_string()));
        state.check(Fault::Opendir)?;

        let key = normalize(path);
        let node = state.nodes.get(&key).ok_or(Errno::ENOENT)?;
        if !matches!(node.kind, NodeKind::Directory) {
            return Err(Errno::ENOTDIR);
        }

        let own = MemoryState::stat_node(node);
        let up = parent(&key)
            .and_then(|p| state.nodes.get(p))
            .map(MemoryState::stat_node)
            .unwrap_or(own);
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
        entries.extend(
            state
                .nodes
                .iter()
                .filter(|(k, _)| !k.is_empty() && parent(k) == Some(key.as_str()))
                .map(|(k, node)| Dirent {
                    name: name_of(k).to_string(),
                    stat: MemoryState::stat_node(node),
                }),
        );

        Ok(MemoryDir {
            path: key,
            entries,
            pos: 0,
        })
    }

    fn readdir<'d>(&mut self, dir: &'d mut MemoryDir) -> LibResult<Option<&'d Dirent>> {
        let mut state = self.session()?;
        state.record(Call::Readdir);
        state.check(Fault::Readdir)?;
        let idx = dir.pos;
        if idx < dir.entries.len() {
            dir.pos += 1;
        }
        Ok(dir.entries.get(idx))
    }

    fn closedir(&mut self, dir: MemoryDir) {
        self.library.lock().record(Call::Closedir(dir.path));
    }

    fn rmdir(&mut self, path: &str) -> LibResult<()> {
        let mut state = self.session()?;
        state.record(Call::Rmdir(path.to_string()));
        state.check(Fault::Rmdir)?;
        let key = normalize(path);
        match state.nodes.get(&key).map(|n| &n.kind) {
            Some(NodeKind::Directory) => {}
            Some(_) => return Err(Errno::ENOTDIR),
            None => return Err(Errno::ENOENT),
        }
        if key.is_empty() {
            return Err(Errno::EACCES);
        }
        if state.has_children(&key) {
            return Err(Errno::ENOTEMPTY);
        }
        state.nodes.remove(&key);
        Ok(())
    }

    fn unlink(&mut self, path: &str) -> LibResult<()> {
        let mut state = self.session()?;
        state.record(Call::Unlink(path.to_string()));
        state.check(Fault::Unlink)?;
        let key = normalize(path);
        match state.nodes.get(&key).map(|n| &n.kind) {
            Some(NodeKind::Directory) => Err(Errno::EISDIR),
            Some(_) => {
                state.nodes.remove(&key);
                Ok(())
            }
            None => Err(Errno::ENOENT),
        }
    }

    fn rename(&mut self, old_path: &str, new_path: &str) -> LibResult<()> {
        let mut state = self.session()?;
        state.record(Call::Rename(old_path.to_string(), new_path.to_string()));
        state.check(Fault::Rename)?;

        let from = normalize(old_path);
        let to = normalize(new_path);
        if from.is_empty() || !state.nodes.contains_key(&from) {
            return Err(Errno::ENOENT);
        }
        if !state.parent_is_dir(&to) {
            return Err(Errno::ENOENT);
        }
        if from == to {
            return Ok(());
        }
        let prefix = format!("{}/", from);
        if to.starts_with(&prefix) {
            return Err(Errno::EINVAL);
        }
        if let Some(existing) = state.nodes.get(&to) {
            if matches!(existing.kind, NodeKind::Directory) && state.has_children(&to) {
                return Err(Errno::ENOTEMPTY);
            }
        }

        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|k| **k == from || k.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = state.nodes.remove(&old) {
                let renamed = format!("{}{}", to, &old[from.len()..]);
                state.nodes.insert(renamed, node);
            }
        }
        Ok(())
    }
}
