//! Tests for file and directory rename operations

use super::TestContext;
use crate::error::{Errno, Error, Operation};
use crate::protocol::UrlProtocol;
use std::fs;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rename_file() {
        let ctx = TestContext::new().unwrap();
        let old_path = ctx.root().join("old_file.txt");
        let new_path = ctx.root().join("new_file.txt");
        fs::write(&old_path, b"test content").unwrap();

        let mut proto = ctx.protocol("old_file.txt");
        proto.move_to(&ctx.url("new_file.txt")).unwrap();

        assert!(!old_path.exists());
        assert_eq!(fs::read(&new_path).unwrap(), b"test content");
        assert!(!proto.is_connected());
    }

    #[test]
    fn test_rename_into_subdirectory() {
        let ctx = TestContext::new().unwrap();
        fs::create_dir(ctx.root().join("archive")).unwrap();
        fs::write(ctx.root().join("2023.log"), b"log").unwrap();

        ctx.protocol("2023.log")
            .move_to(&ctx.url("archive/2023.log"))
            .unwrap();
        assert!(ctx.root().join("archive/2023.log").exists());
    }

    #[test]
    fn test_rename_directory() {
        let ctx = TestContext::new().unwrap();
        fs::create_dir(ctx.root().join("old_dir")).unwrap();
        fs::write(ctx.root().join("old_dir/inner.txt"), b"inner").unwrap();

        ctx.protocol("old_dir").move_to(&ctx.url("new_dir")).unwrap();
        assert!(!ctx.root().join("old_dir").exists());
        assert_eq!(fs::read(ctx.root().join("new_dir/inner.txt")).unwrap(), b"inner");
    }

    #[test]
    fn test_rename_missing_source() {
        let ctx = TestContext::new().unwrap();
        let err = ctx
            .protocol("missing.txt")
            .move_to(&ctx.url("other.txt"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Operation {
                op: Operation::Rename,
                errno: Errno::ENOENT
            }
        ));
    }

    #[test]
    fn test_rename_to_unparseable_destination() {
        let ctx = TestContext::new().unwrap();
        fs::write(ctx.root().join("stay.txt"), b"stay").unwrap();

        let mut proto = ctx.protocol("stay.txt");
        let err = proto.move_to("new_name.txt").unwrap_err();
        assert!(matches!(err, Error::UrlParse(Errno::EINVAL)));
        assert!(ctx.root().join("stay.txt").exists());
        assert!(!proto.is_connected());
    }

    #[test]
    fn test_rename_uses_destination_path_only() {
        let ctx = TestContext::new().unwrap();
        fs::write(ctx.root().join("a.txt"), b"a").unwrap();

        // destination names another server; the rename still happens on the source share
        ctx.protocol("a.txt")
            .move_to("smb://elsewhere/share/b.txt")
            .unwrap();
        assert!(ctx.root().join("b.txt").exists());
    }
}
