//! Streaming zstd compression with position tracking.
//!
//! Every compressed stream in the archive (dictionary files, segment
//! index sidecars, segment files) goes through these wrappers. The
//! compressor tracks both the uncompressed position (what callers have
//! appended) and the compressed bytes actually written to the file, which
//! the archive writer needs for its stable-size accounting.
//!
//! `flush` ends the current zstd block and pushes it to the file without
//! terminating the frame, so a reader that opens the file afterwards can
//! decode everything appended so far. `finish` terminates the frame and
//! returns the underlying file.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use crate::error::{ReadError, Result};

/// Default compression level used when the caller has no opinion.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Write adapter that counts bytes reaching the underlying file.
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Streaming zstd compressor over a file.
pub struct ZstdCompressor {
    encoder: Option<zstd::stream::write::Encoder<'static, CountingWriter<File>>>,
    level: i32,
    uncompressed_pos: u64,
}

impl ZstdCompressor {
    /// Starts a compressed stream at the file's current position.
    pub fn open(file: File, level: i32) -> Result<Self> {
        let counting = CountingWriter {
            inner: file,
            written: 0,
        };
        let encoder = zstd::stream::write::Encoder::new(counting, level)?;
        Ok(ZstdCompressor {
            encoder: Some(encoder),
            level,
            uncompressed_pos: 0,
        })
    }

    fn encoder(
        &mut self,
    ) -> &mut zstd::stream::write::Encoder<'static, CountingWriter<File>> {
        self.encoder.as_mut().expect("compressor already finished")
    }

    /// Appends uncompressed bytes to the stream. Returns the uncompressed
    /// position at which the bytes were placed.
    pub fn write(&mut self, data: &[u8]) -> Result<u64> {
        let pos = self.uncompressed_pos;
        self.encoder().write_all(data)?;
        self.uncompressed_pos += data.len() as u64;
        Ok(pos)
    }

    /// Total uncompressed bytes appended so far.
    pub fn uncompressed_pos(&self) -> u64 {
        self.uncompressed_pos
    }

    /// Compressed bytes that have reached the file. Accurate after a
    /// `flush` or `end_frame`; mid-block data may still sit in the
    /// encoder.
    pub fn compressed_size(&self) -> u64 {
        self.encoder
            .as_ref()
            .map(|e| e.get_ref().written)
            .unwrap_or(0)
    }

    /// Ends the current block and flushes it through to the file, leaving
    /// the frame open for further appends.
    pub fn flush(&mut self) -> Result<()> {
        self.encoder().flush()?;
        Ok(())
    }

    /// Terminates the current frame and starts a new one at the file's
    /// current position. Everything appended so far is decodable by a
    /// reader that stops at the frame boundary; further appends land in
    /// the next frame (streaming decoders process concatenated frames
    /// transparently).
    pub fn end_frame(&mut self) -> Result<()> {
        let counting = self
            .encoder
            .take()
            .expect("compressor already finished")
            .finish()?;
        self.encoder = Some(zstd::stream::write::Encoder::new(counting, self.level)?);
        Ok(())
    }

    /// Terminates the frame, syncs, and returns the file together with
    /// the total compressed size.
    pub fn finish(mut self) -> Result<(File, u64)> {
        let counting = self
            .encoder
            .take()
            .expect("compressor already finished")
            .finish()?;
        let written = counting.written;
        let mut file = counting.inner;
        file.flush()?;
        Ok((file, written))
    }
}

/// Streaming zstd decompressor over a file.
pub struct ZstdDecompressor {
    decoder: zstd::stream::read::Decoder<'static, BufReader<File>>,
}

impl ZstdDecompressor {
    /// Starts decoding at the file's current position.
    pub fn open(file: File) -> Result<Self> {
        Ok(ZstdDecompressor {
            decoder: zstd::stream::read::Decoder::new(file)?,
        })
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(File::open(path)?)
    }

    /// Reads exactly `buf.len()` decompressed bytes; `Truncated` if the
    /// stream ends first, `EndOfFile` if it was already exhausted.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut total = 0usize;
        while total < buf.len() {
            let n = self.decoder.read(&mut buf[total..])?;
            if n == 0 {
                if total == 0 {
                    return Err(ReadError::EndOfFile);
                }
                return Err(ReadError::Truncated {
                    needed: buf.len(),
                    got: total,
                });
            }
            total += n;
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_le_bytes(buf))
    }

    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Decompresses the rest of the stream into memory.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}
