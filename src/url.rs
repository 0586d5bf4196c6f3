//! `smb://` URL parsing
//!
//! Grammar accepted by [`SmbUrl::parse`]:
//!
//! ```text
//! smb://[domain;][user[:password]@]server[:port]/share[/path]
//! ```
//!
//! The path is kept relative to the share root, without a leading slash.

use crate::error::Errno;
use std::fmt;
use tracing::debug;

/// URL scheme handled by this crate
pub const SMB_SCHEME: &str = "smb";

/// Longest URL accepted by the parser
pub const MAX_URL_SIZE: usize = 1024;

/// Parsed SMB resource URL
#[derive(Clone, PartialEq, Eq)]
pub struct SmbUrl {
    /// Authentication domain, from the `domain;` prefix
    pub domain: Option<String>,
    /// User name
    pub user: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Server, including `:port` when one was given
    pub server: String,
    /// Share name
    pub share: String,
    /// Path inside the share, empty for the share root
    pub path: String,
}

/// Reason a URL was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    TooLong(usize),
    BadScheme,
    MissingServer,
    MissingShare,
    BadPort(String),
    QueryNotSupported,
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlError::TooLong(len) => write!(f, "URL is too long ({} > {} bytes)", len, MAX_URL_SIZE),
            UrlError::BadScheme => write!(f, "URL does not start with 'smb://'"),
            UrlError::MissingServer => write!(f, "URL has no server"),
            UrlError::MissingShare => write!(f, "URL has no share"),
            UrlError::BadPort(port) => write!(f, "invalid port '{}'", port),
            UrlError::QueryNotSupported => write!(f, "query arguments and fragments are not supported"),
        }
    }
}

impl From<UrlError> for Errno {
    fn from(_: UrlError) -> Self {
        Errno::EINVAL
    }
}

impl SmbUrl {
    /// Parse an `smb://` URL
    pub fn parse(url: &str) -> std::result::Result<Self, UrlError> {
        if url.len() > MAX_URL_SIZE {
            return Err(UrlError::TooLong(url.len()));
        }

        let rest = url
            .split_once("://")
            .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(SMB_SCHEME))
            .map(|(_, rest)| rest)
            .ok_or(UrlError::BadScheme)?;

        if rest.contains(|c: char| c == '?' || c == '#') {
            return Err(UrlError::QueryNotSupported);
        }

        let (authority, remainder) = rest.split_once('/').unwrap_or((rest, ""));

        // Credentials end at the last '@' so passwords may contain one
        let (userinfo, server) = match authority.rsplit_once('@') {
            Some((userinfo, server)) => (Some(userinfo), server),
            None => (None, authority),
        };

        let (domain, user, password) = match userinfo {
            Some(userinfo) => {
                let (domain, credentials) = match userinfo.split_once(';') {
                    Some((domain, credentials)) => (non_empty(domain), credentials),
                    None => (None, userinfo),
                };
                let (user, password) = match credentials.split_once(':') {
                    Some((user, password)) => (non_empty(user), Some(password.to_string())),
                    None => (non_empty(credentials), None),
                };
                (domain, user, password)
            }
            None => (None, None, None),
        };

        if server.is_empty() {
            return Err(UrlError::MissingServer);
        }
        validate_port(server)?;

        let (share, path) = remainder.split_once('/').unwrap_or((remainder, ""));
        if share.is_empty() {
            return Err(UrlError::MissingShare);
        }

        let parsed = SmbUrl {
            domain,
            user,
            password,
            server: server.to_string(),
            share: share.to_string(),
            path: path.trim_end_matches('/').to_string(),
        };
        debug!("Parsed {:?}", parsed);
        Ok(parsed)
    }

    /// Server host without the port
    pub fn host(&self) -> &str {
        split_port(&self.server).0
    }

    /// Explicit port, if the URL carried one
    pub fn port(&self) -> Option<u16> {
        split_port(&self.server).1.and_then(|p| p.parse().ok())
    }

    /// True when both URLs address the same share on the same server
    pub fn same_share(&self, other: &SmbUrl) -> bool {
        self.server.eq_ignore_ascii_case(&other.server) && self.share.eq_ignore_ascii_case(&other.share)
    }
}

// Passwords never reach logs
impl fmt::Debug for SmbUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmbUrl")
            .field("domain", &self.domain)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("server", &self.server)
            .field("share", &self.share)
            .field("path", &self.path)
            .finish()
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Split `host[:port]` (or `[v6addr]:port`) into host and port text
pub(crate) fn split_port(server: &str) -> (&str, Option<&str>) {
    if let Some(bracketed) = server.strip_prefix('[') {
        // [v6addr]:port
        return match bracketed.split_once(']') {
            Some((host, rest)) => (host, rest.strip_prefix(':')),
            None => (server, None),
        };
    }
    match server.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, Some(port)),
        _ => (server, None),
    }
}

fn validate_port(server: &str) -> std::result::Result<(), UrlError> {
    let (host, port) = split_port(server);
    if host.is_empty() {
        return Err(UrlError::MissingServer);
    }
    match port {
        Some(port) if port.parse::<u16>().is_err() => Err(UrlError::BadPort(port.to_string())),
        _ => Ok(()),
    }
}
