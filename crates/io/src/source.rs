//! The `Source` capability: a byte stream readable front to back.
//!
//! Every reader in the archive is built against this trait rather than a
//! concrete file type, so the same buffered reader serves local files,
//! in-memory buffers and forward-only streams (e.g. an object-store GET
//! body). Native seeking is optional; sources that cannot seek return
//! `Unsupported` and the buffered reader falls back to read-and-discard.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{ReadError, Result};

/// A forward-readable byte stream.
pub trait Source {
    /// Reads up to `buf.len()` bytes. Returns the number of bytes read;
    /// zero means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Seeks to an absolute position, if the source supports it.
    fn seek_from_begin(&mut self, _pos: u64) -> Result<()> {
        Err(ReadError::Unsupported("source cannot seek"))
    }
}

/// A local file as a source. Supports native seeking.
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(FileSource {
            file: File::open(path)?,
        })
    }

    pub fn from_file(file: File) -> Self {
        FileSource { file }
    }
}

impl Source for FileSource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf)?)
    }

    fn seek_from_begin(&mut self, pos: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }
}

/// An owned in-memory buffer as a source. Supports seeking.
pub struct MemorySource {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        MemorySource { data, pos: 0 }
    }
}

impl Source for MemorySource {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.data.len() - self.pos;
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek_from_begin(&mut self, pos: u64) -> Result<()> {
        if pos > self.data.len() as u64 {
            return Err(ReadError::OutOfBounds(pos));
        }
        self.pos = pos as usize;
        Ok(())
    }
}

/// Wrapper that hides an inner source's seek support, modeling streams
/// that only ever move forward.
pub struct ForwardOnly<S>(pub S);

impl<S: Source> Source for ForwardOnly<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.0.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn memory_source_reads_and_seeks() {
        let mut src = MemorySource::new(b"hello world".to_vec());
        let mut buf = [0u8; 5];
        assert_eq!(src.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        src.seek_from_begin(6).unwrap();
        assert_eq!(src.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");

        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn memory_source_rejects_seek_past_end() {
        let mut src = MemorySource::new(vec![1, 2, 3]);
        assert!(matches!(
            src.seek_from_begin(4),
            Err(ReadError::OutOfBounds(4))
        ));
    }

    #[test]
    fn forward_only_denies_seek() {
        let mut src = ForwardOnly(MemorySource::new(vec![1, 2, 3]));
        assert!(matches!(
            src.seek_from_begin(0),
            Err(ReadError::Unsupported(_))
        ));
        let mut buf = [0u8; 3];
        assert_eq!(src.read(&mut buf).unwrap(), 3);
    }

    #[test]
    fn file_source_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"abcdef")
            .unwrap();

        let mut src = FileSource::open(&path).unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(src.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"abcdef");

        src.seek_from_begin(2).unwrap();
        let mut buf2 = [0u8; 2];
        assert_eq!(src.read(&mut buf2).unwrap(), 2);
        assert_eq!(&buf2, b"cd");
    }
}
