//! SMB URL protocol handler in Rust
//!
//! Lets an I/O layer treat `smb://[domain;][user[:password]@]server[:port]/share/path`
//! resources like local ones: open, read, write, seek, list, delete and move.
//! The SMB client itself sits behind the [`library::SmbLibrary`] trait so the
//! handler can run over any client library.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod library;
pub mod options;
pub mod protocol;
pub mod smb;
pub mod url;

#[cfg(test)]
pub mod e2e_tests;

pub use error::{Errno, Error, Result};
pub use library::{LocalLibrary, LocalShare, MemoryLibrary, SmbContext, SmbLibrary};
#[cfg(feature = "smbclient")]
pub use library::SmbClientLibrary;
pub use options::SmbOptions;
pub use protocol::{AvioFlags, DirEntry, EntryType, ReadOutcome, UrlProtocol, UrlStream, Whence};
pub use smb::SmbProtocol;
pub use url::SmbUrl;
