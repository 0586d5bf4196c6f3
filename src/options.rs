//! User-settable options of the SMB protocol handler

use crate::error::{Error, Result};
use bitflags::bitflags;
use std::time::Duration;

/// Timeout value meaning "use the library default"
pub const TIMEOUT_LIBRARY_DEFAULT: i32 = -1;

bitflags! {
    /// Which side of the I/O layer an option applies to
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OptionFlags: u32 {
        const DECODING_PARAM = 0x0001;
        const ENCODING_PARAM = 0x0002;
    }
}

/// Value type of an option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Int { default: i64, min: i64, max: i64 },
    Str,
}

/// Named option descriptor
#[derive(Debug, Clone, Copy)]
pub struct OptionDef {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: OptionKind,
    pub flags: OptionFlags,
}

/// Options understood by the SMB protocol handler
pub static OPTIONS: &[OptionDef] = &[
    OptionDef {
        name: "timeout",
        help: "set timeout in ms of socket I/O operations",
        kind: OptionKind::Int {
            default: TIMEOUT_LIBRARY_DEFAULT as i64,
            min: -1,
            max: i32::MAX as i64,
        },
        flags: OptionFlags::DECODING_PARAM.union(OptionFlags::ENCODING_PARAM),
    },
    OptionDef {
        name: "truncate",
        help: "truncate existing files on write",
        kind: OptionKind::Int {
            default: 1,
            min: 0,
            max: 1,
        },
        flags: OptionFlags::ENCODING_PARAM,
    },
    OptionDef {
        name: "workgroup",
        help: "set the workgroup used for making connections",
        kind: OptionKind::Str,
        flags: OptionFlags::DECODING_PARAM.union(OptionFlags::ENCODING_PARAM),
    },
];

/// Look up an option descriptor by name
pub fn find_option(name: &str) -> Option<&'static OptionDef> {
    OPTIONS.iter().find(|opt| opt.name == name)
}

/// Per-resource configuration, applied when the connection is set up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbOptions {
    /// Socket I/O timeout in milliseconds, `-1` for the library default
    pub timeout: i32,
    /// Truncate existing files when opening for writing
    pub truncate: bool,
    /// Workstation/workgroup name sent during authentication
    pub workgroup: Option<String>,
}

impl Default for SmbOptions {
    fn default() -> Self {
        Self {
            timeout: TIMEOUT_LIBRARY_DEFAULT,
            truncate: true,
            workgroup: None,
        }
    }
}

impl SmbOptions {
    /// Configured timeout, or `None` when the library default applies
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout).ok().map(Duration::from_millis)
    }

    /// Workgroup to apply; empty names count as unset
    pub fn workgroup(&self) -> Option<&str> {
        self.workgroup.as_deref().filter(|w| !w.is_empty())
    }

    /// Set an option by name from its string form
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let def = find_option(name).ok_or_else(|| Error::InvalidOption(format!("unknown option '{}'", name)))?;

        match (def.name, def.kind) {
            ("workgroup", OptionKind::Str) => {
                self.workgroup = (!value.is_empty()).then(|| value.to_string());
            }
            ("timeout", OptionKind::Int { min, max, .. }) => {
                self.timeout = parse_int(name, value, min, max)? as i32;
            }
            ("truncate", OptionKind::Int { min, max, .. }) => {
                self.truncate = parse_int(name, value, min, max)? != 0;
            }
            _ => return Err(Error::InvalidOption(format!("option '{}' is not settable", name))),
        }
        Ok(())
    }

    /// Current value of an option in its string form
    pub fn get(&self, name: &str) -> Option<String> {
        match name {
            "timeout" => Some(self.timeout.to_string()),
            "truncate" => Some(u8::from(self.truncate).to_string()),
            "workgroup" => Some(self.workgroup.clone().unwrap_or_default()),
            _ => None,
        }
    }
}

fn parse_int(name: &str, value: &str, min: i64, max: i64) -> Result<i64> {
    let parsed = match value.trim() {
        "true" | "on" | "yes" => 1,
        "false" | "off" | "no" => 0,
        v => v
            .parse::<i64>()
            .map_err(|_| Error::InvalidOption(format!("'{}' is not a valid value for '{}'", value, name)))?,
    };
    if parsed < min || parsed > max {
        return Err(Error::InvalidOption(format!(
            "value {} for '{}' out of range [{} - {}]",
            parsed, name, min, max
        )));
    }
    Ok(parsed)
}
