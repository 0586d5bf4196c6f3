//! Tests for directory listings

use super::TestContext;
use crate::error::{Errno, Error, Operation};
use crate::protocol::{EntryType, UrlProtocol};
use filetime::{set_file_mtime, FileTime};
use std::fs;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_share_root() {
        let ctx = TestContext::new().unwrap();
        fs::write(ctx.root().join("b.txt"), b"bb").unwrap();
        fs::write(ctx.root().join("a.txt"), b"a").unwrap();
        fs::create_dir(ctx.root().join("sub")).unwrap();

        let entries = ctx.list("").unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(entries[0].entry_type, EntryType::File);
        assert_eq!(entries[2].entry_type, EntryType::Directory);
    }

    #[test]
    fn test_dot_entries_are_hidden() {
        let ctx = TestContext::new().unwrap();
        fs::create_dir(ctx.root().join("empty")).unwrap();

        assert!(ctx.list("empty").unwrap().is_empty());
    }

    #[test]
    fn test_entries_carry_their_own_size_and_times() {
        let ctx = TestContext::new().unwrap();
        let dir = ctx.root().join("photos");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("small.jpg"), vec![0u8; 10]).unwrap();
        fs::write(dir.join("large.jpg"), vec![0u8; 4096]).unwrap();
        set_file_mtime(dir.join("small.jpg"), FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
        set_file_mtime(dir.join("large.jpg"), FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
        set_file_mtime(&dir, FileTime::from_unix_time(1_500_000_000, 0)).unwrap();

        let entries = ctx.list("photos").unwrap();
        assert_eq!(entries.len(), 2);

        let large = &entries[0];
        assert_eq!(large.name, "large.jpg");
        assert_eq!(large.size, 4096);
        assert_eq!(large.modification_timestamp, 1_700_000_000 * 1_000_000);

        let small = &entries[1];
        assert_eq!(small.name, "small.jpg");
        assert_eq!(small.size, 10);
        assert_eq!(small.modification_timestamp, 1_600_000_000 * 1_000_000);

        // not provided by the library
        assert_eq!(small.user_id, -1);
        assert_eq!(small.group_id, -1);
        assert_eq!(small.filemode, -1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_is_unknown_type() {
        let ctx = TestContext::new().unwrap();
        fs::write(ctx.root().join("target"), b"t").unwrap();
        std::os::unix::fs::symlink(ctx.root().join("target"), ctx.root().join("shortcut")).unwrap();

        let entries = ctx.list("").unwrap();
        let link = entries.iter().find(|e| e.name == "shortcut").unwrap();
        assert_eq!(link.entry_type, EntryType::Unknown);
    }

    #[test]
    fn test_open_dir_on_file_fails() {
        let ctx = TestContext::new().unwrap();
        fs::write(ctx.root().join("plain.txt"), b"x").unwrap();

        let mut proto = ctx.protocol("plain.txt");
        let err = proto.open_dir().unwrap_err();
        assert!(matches!(
            err,
            Error::Operation {
                op: Operation::OpenDir,
                errno: Errno::ENOTDIR
            }
        ));
        assert!(!proto.is_connected());
    }

    #[test]
    fn test_open_missing_dir_fails() {
        let ctx = TestContext::new().unwrap();
        let err = ctx.list("missing").unwrap_err();
        assert_eq!(err.errno(), Errno::ENOENT);
    }

    #[test]
    fn test_listing_is_exhausted_once() {
        let ctx = TestContext::new().unwrap();
        fs::write(ctx.root().join("only"), b"1").unwrap();

        let mut proto = ctx.protocol("");
        proto.open_dir().unwrap();
        assert!(proto.read_dir().unwrap().is_some());
        assert!(proto.read_dir().unwrap().is_none());
        assert!(proto.read_dir().unwrap().is_none());
        proto.close_dir().unwrap();
        assert!(!proto.is_connected());
        assert!(matches!(proto.read_dir(), Err(Error::NotOpen("directory"))));
    }
}
