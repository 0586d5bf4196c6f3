//! `std::io` adapter over a [`UrlProtocol`]

use super::{ReadOutcome, UrlProtocol, Whence};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Exposes an opened protocol context as a `Read + Write + Seek` stream
///
/// End of file is reported as `Ok(0)` the way `std::io` expects.
pub struct UrlStream<P: UrlProtocol> {
    inner: P,
}

impl<P: UrlProtocol> UrlStream<P> {
    /// Wrap an already opened context
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    /// Total size, from the protocol's size query
    pub fn size(&mut self) -> io::Result<u64> {
        let size = self.inner.seek(0, Whence::Size)?;
        u64::try_from(size).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative size"))
    }

    pub fn get_ref(&self) -> &P {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    /// Close the context and hand it back
    pub fn close(mut self) -> io::Result<P> {
        self.inner.close()?;
        Ok(self.inner)
    }
}

impl<P: UrlProtocol> Read for UrlStream<P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.inner.read(buf)? {
            ReadOutcome::Data(n) => Ok(n),
            ReadOutcome::Eof => Ok(0),
        }
    }
}

impl<P: UrlProtocol> Write for UrlStream<P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.inner.write(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<P: UrlProtocol> Seek for UrlStream<P> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(n) => (
                i64::try_from(n).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset too large"))?,
                Whence::Set,
            ),
            SeekFrom::Current(n) => (n, Whence::Cur),
            SeekFrom::End(n) => (n, Whence::End),
        };
        let newpos = self.inner.seek(offset, whence)?;
        u64::try_from(newpos).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "negative offset"))
    }
}
