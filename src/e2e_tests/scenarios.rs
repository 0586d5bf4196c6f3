//! End-to-end scenarios
//!
//! Whole workflows through the handler, the way an I/O layer drives it.

use super::TestContext;
use crate::error::{Errno, Error};
use crate::options::SmbOptions;
use crate::protocol::{AvioFlags, EntryType, ReadOutcome, UrlProtocol, UrlStream, Whence};
use crate::smb::SmbProtocol;
use std::fs;
use std::io::Read;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_back() {
        let ctx = TestContext::new().unwrap();
        fs::create_dir(ctx.root().join("reports")).unwrap();
        let url = "smb://guest@host/share/reports/out.txt";
        let payload: Vec<u8> = (0..100u8).collect();

        let mut writer =
            SmbProtocol::open_url(ctx.library.clone(), url, AvioFlags::WRITE, SmbOptions::default()).unwrap();
        assert_eq!(writer.write(&payload).unwrap(), 100);
        writer.close().unwrap();

        let mut reader =
            SmbProtocol::open_url(ctx.library.clone(), url, AvioFlags::READ, SmbOptions::default()).unwrap();
        assert_eq!(reader.seek(0, Whence::Size).unwrap(), 100);

        let mut buf = vec![0u8; 100];
        assert_eq!(reader.read(&mut buf).unwrap(), ReadOutcome::Data(100));
        assert_eq!(buf, payload);
        assert_eq!(reader.read(&mut buf).unwrap(), ReadOutcome::Eof);
        reader.close().unwrap();
    }

    #[test]
    fn test_delete_non_empty_directory_leaves_it_in_place() {
        let ctx = TestContext::new().unwrap();
        fs::create_dir(ctx.root().join("archive")).unwrap();
        fs::write(ctx.root().join("archive/2019.tar"), b"tar").unwrap();

        let err = ctx.protocol("archive").delete().unwrap_err();
        assert_eq!(err.errno(), Errno::ENOTEMPTY);
        assert_eq!(err.to_averror(), -libc::ENOTEMPTY);
        assert!(ctx.root().join("archive/2019.tar").exists());
    }

    #[test]
    fn test_move_within_share() {
        let ctx = TestContext::new().unwrap();
        fs::write(ctx.root().join("a.txt"), b"moved").unwrap();

        let mut proto = SmbProtocol::new(ctx.library.clone(), "smb://host/share/a.txt");
        proto.move_to("smb://host/share/b.txt").unwrap();

        assert!(!ctx.root().join("a.txt").exists());
        assert_eq!(fs::read(ctx.root().join("b.txt")).unwrap(), b"moved");
        assert!(!proto.is_connected());
    }

    #[test]
    fn test_full_file_workflow() {
        let ctx = TestContext::new().unwrap();
        fs::create_dir(ctx.root().join("work")).unwrap();

        // 1. Create a file
        let mut proto = ctx.open("work/draft.txt", AvioFlags::WRITE).unwrap();
        proto.write(b"first draft").unwrap();
        proto.close().unwrap();

        // 2. It shows up in the listing
        let entries = ctx.list("work").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "draft.txt");
        assert_eq!(entries[0].entry_type, EntryType::File);
        assert_eq!(entries[0].size, 11);

        // 3. Rename it
        ctx.protocol("work/draft.txt")
            .move_to(&ctx.url("work/final.txt"))
            .unwrap();

        // 4. Read it through the std::io adapter
        let mut stream = UrlStream::new(ctx.open("work/final.txt", AvioFlags::READ).unwrap());
        let mut contents = String::new();
        stream.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first draft");
        drop(stream);

        // 5. The directory cannot go while it has children
        let err = ctx.protocol("work").delete().unwrap_err();
        assert_eq!(err.errno(), Errno::ENOTEMPTY);

        // 6. Delete the file, then the directory
        ctx.protocol("work/final.txt").delete().unwrap();
        ctx.protocol("work").delete().unwrap();
        assert!(ctx.list("").unwrap().is_empty());
    }

    #[test]
    fn test_handler_is_reusable_after_close() {
        let ctx = TestContext::new().unwrap();
        fs::write(ctx.root().join("a.txt"), b"aaa").unwrap();
        fs::create_dir(ctx.root().join("dir")).unwrap();

        let mut proto = ctx.protocol("a.txt");
        proto.open(AvioFlags::READ).unwrap();
        assert!(matches!(proto.open(AvioFlags::READ), Err(Error::AlreadyConnected)));
        proto.close().unwrap();
        proto.close().unwrap();

        proto.open(AvioFlags::READ).unwrap();
        assert_eq!(proto.seek(0, Whence::Size).unwrap(), 3);
        proto.close().unwrap();

        proto.delete().unwrap();
        assert!(!ctx.root().join("a.txt").exists());
    }

    #[test]
    fn test_host_error_codes() {
        let ctx = TestContext::new().unwrap();

        let err = ctx.open("missing", AvioFlags::READ).unwrap_err();
        assert_eq!(err.to_averror(), -libc::ENOENT);

        let err = SmbProtocol::open_url(
            ctx.library.clone(),
            "smb://host/share/a?x=1",
            AvioFlags::READ,
            SmbOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UrlParse(_)));
        assert_eq!(err.to_averror(), -libc::EINVAL);

        let io_err = std::io::Error::from(Error::SizeUnknown);
        assert_eq!(io_err.raw_os_error(), None);
        assert_eq!(io_err.kind(), std::io::Error::from_raw_os_error(libc::EIO).kind());
    }
}
