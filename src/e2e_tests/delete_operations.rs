//! Tests for deleting files and directories

use super::TestContext;
use crate::error::{Errno, Error, Operation};
use crate::protocol::UrlProtocol;
use std::fs;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_file() {
        let ctx = TestContext::new().unwrap();
        let file_path = ctx.root().join("delete_me.txt");
        fs::write(&file_path, b"test content").unwrap();

        let mut proto = ctx.protocol("delete_me.txt");
        proto.delete().unwrap();

        assert!(!file_path.exists());
        assert!(!proto.is_connected());
    }

    #[test]
    fn test_delete_empty_directory() {
        let ctx = TestContext::new().unwrap();
        let dir_path = ctx.root().join("empty_dir");
        fs::create_dir(&dir_path).unwrap();

        ctx.protocol("empty_dir").delete().unwrap();
        assert!(!dir_path.exists());
    }

    #[test]
    fn test_delete_non_empty_directory_fails() {
        let ctx = TestContext::new().unwrap();
        let dir_path = ctx.root().join("full_dir");
        fs::create_dir(&dir_path).unwrap();
        fs::write(dir_path.join("keep.txt"), b"keep").unwrap();

        let mut proto = ctx.protocol("full_dir");
        let err = proto.delete().unwrap_err();
        assert!(matches!(
            err,
            Error::Operation {
                op: Operation::Rmdir,
                errno: Errno::ENOTEMPTY
            }
        ));
        assert!(dir_path.join("keep.txt").exists());
        assert!(!proto.is_connected());
    }

    #[test]
    fn test_delete_missing_file() {
        let ctx = TestContext::new().unwrap();
        let err = ctx.protocol("ghost.txt").delete().unwrap_err();
        assert!(matches!(
            err,
            Error::Operation {
                op: Operation::Open,
                errno: Errno::ENOENT
            }
        ));
        assert!(!ctx.root().join("ghost.txt").exists());
    }

    #[test]
    fn test_delete_on_read_only_share() {
        let ctx = TestContext::read_only().unwrap();
        let file_path = ctx.root().join("locked.txt");
        fs::write(&file_path, b"locked").unwrap();

        let err = ctx.protocol("locked.txt").delete().unwrap_err();
        assert_eq!(err.errno(), Errno::EACCES);
        assert!(file_path.exists());
    }

    #[test]
    fn test_delete_nested_file_keeps_parent() {
        let ctx = TestContext::new().unwrap();
        let dir_path = ctx.root().join("reports");
        fs::create_dir(&dir_path).unwrap();
        fs::write(dir_path.join("q1.csv"), b"1,2,3").unwrap();
        fs::write(dir_path.join("q2.csv"), b"4,5,6").unwrap();

        ctx.protocol("reports/q1.csv").delete().unwrap();
        assert!(!dir_path.join("q1.csv").exists());
        assert_eq!(fs::read(dir_path.join("q2.csv")).unwrap(), b"4,5,6");
    }
}
