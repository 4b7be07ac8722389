//! Buffered reading with checkpoint-controlled seek-back.
//!
//! `BufferedReader` wraps a [`Source`] and controls exactly when and how
//! much data is buffered. Without a checkpoint it keeps a fixed-size
//! buffer and only moves forward. With a checkpoint set, the buffer grows
//! to cover every byte from the checkpoint to the highest position read,
//! so callers may seek backward anywhere in that window — the mechanism
//! that lets higher layers perform unordered reads over inputs that only
//! support sequential access.
//!
//! # Positions
//!
//! All positions are absolute byte offsets in the underlying stream. The
//! buffer covers `[buffer_begin_pos, buffer_begin_pos + buffer.len())`
//! and the read head always sits inside or at the end of that window.
//!
//! # Buffer sizing
//!
//! The base buffer size must be a power of two and a multiple of 4096;
//! refills are quantized up to that grid so the reader never issues
//! sub-page reads against the source.

use tracing::trace;

use crate::error::{ReadError, Result};
use crate::source::Source;

/// Smallest permitted base buffer size (one page).
pub const MIN_BUFFER_SIZE: usize = 4096;

/// Default base buffer size (16 pages), matching the fixed-size window
/// used when no checkpoint is set.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * MIN_BUFFER_SIZE;

pub struct BufferedReader<S: Source> {
    source: S,
    /// Read head, as an absolute stream position.
    pos: u64,
    /// Buffered bytes, starting at `buffer_begin_pos` in the stream.
    buffer: Vec<u8>,
    buffer_begin_pos: u64,
    base_buffer_size: usize,
    checkpoint_pos: Option<u64>,
    highest_read_pos: u64,
}

impl<S: Source> BufferedReader<S> {
    /// Creates a reader with the given base buffer size.
    ///
    /// Fails with `BadParam` unless the size is a power of two and a
    /// multiple of 4096.
    pub fn new(source: S, base_buffer_size: usize) -> Result<Self> {
        if base_buffer_size == 0 {
            return Err(ReadError::BadParam("buffer size must be nonzero"));
        }
        if base_buffer_size % MIN_BUFFER_SIZE != 0 {
            return Err(ReadError::BadParam("buffer size must be a multiple of 4096"));
        }
        if !base_buffer_size.is_power_of_two() {
            return Err(ReadError::BadParam("buffer size must be a power of two"));
        }
        Ok(BufferedReader {
            source,
            pos: 0,
            buffer: Vec::new(),
            buffer_begin_pos: 0,
            base_buffer_size,
            checkpoint_pos: None,
            highest_read_pos: 0,
        })
    }

    pub fn with_default_buffer(source: S) -> Self {
        // DEFAULT_BUFFER_SIZE satisfies every constraint
        Self::new(source, DEFAULT_BUFFER_SIZE).unwrap()
    }

    /// Current read-head position.
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Highest position the caller has read or seeked to.
    pub fn highest_read_pos(&self) -> u64 {
        self.highest_read_pos
    }

    pub fn checkpoint_pos(&self) -> Option<u64> {
        self.checkpoint_pos
    }

    /// Reads up to `buf.len()` bytes, refilling from the source as
    /// needed. Returns the number of bytes read; `EndOfFile` if the
    /// stream is exhausted before anything could be read.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0usize;
        loop {
            let off = self.head_offset();
            let avail = self.buffer.len() - off;
            let n = avail.min(buf.len() - total);
            buf[total..total + n].copy_from_slice(&self.buffer[off..off + n]);
            total += n;
            self.pos += n as u64;

            if total == buf.len() {
                break;
            }
            match self.refill(self.base_buffer_size) {
                Ok(_) => {}
                Err(ReadError::EndOfFile) => break,
                Err(e) => return Err(e),
            }
        }
        if total == 0 && !buf.is_empty() {
            return Err(ReadError::EndOfFile);
        }
        self.note_read_head();
        Ok(total)
    }

    /// Reads exactly `buf.len()` bytes or fails with `Truncated`
    /// (`EndOfFile` if nothing at all was available).
    pub fn try_read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let n = self.try_read(buf)?;
        if n < buf.len() {
            return Err(ReadError::Truncated {
                needed: buf.len(),
                got: n,
            });
        }
        Ok(())
    }

    /// Reads up to (and optionally including) the next occurrence of
    /// `delim`, appending to or replacing `out`.
    pub fn try_read_to_delimiter(
        &mut self,
        delim: u8,
        keep_delimiter: bool,
        append: bool,
        out: &mut String,
    ) -> Result<()> {
        if !append {
            out.clear();
        }
        let mut collected: Vec<u8> = Vec::new();
        let mut found = false;

        while !found {
            let off = self.head_offset();
            if off == self.buffer.len() {
                match self.refill(self.base_buffer_size) {
                    Ok(_) => {}
                    Err(ReadError::EndOfFile) => {
                        if collected.is_empty() {
                            return Err(ReadError::EndOfFile);
                        }
                        break;
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }

            let window = &self.buffer[off..];
            match window.iter().position(|&b| b == delim) {
                Some(i) => {
                    let take = if keep_delimiter { i + 1 } else { i };
                    collected.extend_from_slice(&window[..take]);
                    // The delimiter is always consumed from the stream
                    self.pos += (i + 1) as u64;
                    found = true;
                }
                None => {
                    collected.extend_from_slice(window);
                    self.pos += window.len() as u64;
                }
            }
        }

        let text = std::str::from_utf8(&collected)
            .map_err(|_| ReadError::Corrupt("delimited read is not valid UTF-8"))?;
        out.push_str(text);
        self.note_read_head();
        Ok(())
    }

    /// Returns up to `size_to_peek` buffered bytes ahead of the read head
    /// without advancing it, refilling once if the buffer is empty.
    ///
    /// The returned span is invalidated by any subsequent read, peek or
    /// seek.
    pub fn peek_buffered_data(&mut self, size_to_peek: usize) -> Result<&[u8]> {
        if self.head_offset() == self.buffer.len() {
            self.refill(self.base_buffer_size)?;
        }
        let off = self.head_offset();
        let end = (off + size_to_peek).min(self.buffer.len());
        Ok(&self.buffer[off..end])
    }

    /// Tries to fill the internal buffer if it is empty.
    pub fn try_refill_buffer_if_empty(&mut self) -> Result<()> {
        if self.head_offset() == self.buffer.len() {
            self.refill(self.base_buffer_size)?;
        }
        Ok(())
    }

    /// Seeks to `pos`.
    ///
    /// Backward seeks require a checkpoint and must not pass it
    /// (`OutOfBounds` otherwise). Forward seeks advance the source,
    /// by native seek when supported or by reading and discarding;
    /// `Truncated` if the stream ends first.
    pub fn try_seek_from_begin(&mut self, pos: u64) -> Result<()> {
        if pos == self.pos {
            return Ok(());
        }

        if pos < self.pos {
            let Some(cp) = self.checkpoint_pos else {
                return Err(ReadError::OutOfBounds(pos));
            };
            if pos < cp {
                return Err(ReadError::OutOfBounds(pos));
            }
            // The buffer covers [checkpoint, buffer_end) while a
            // checkpoint is set, so the target is resident.
            self.pos = pos;
        } else {
            let buffer_end = self.buffer_end_pos();
            if pos <= buffer_end {
                self.pos = pos;
            } else if self.checkpoint_pos.is_none() {
                match self.source.seek_from_begin(pos) {
                    Ok(()) => {}
                    Err(ReadError::Unsupported(_)) => self.discard_until(pos)?,
                    Err(e) => return Err(e),
                }
                self.buffer.clear();
                self.buffer_begin_pos = pos;
                self.pos = pos;
            } else {
                let mut remaining = (pos - buffer_end) as usize;
                while remaining > 0 {
                    match self.refill(remaining) {
                        Ok(n) => remaining = remaining.saturating_sub(n),
                        Err(ReadError::EndOfFile) => {
                            return Err(ReadError::Truncated {
                                needed: (pos - buffer_end) as usize,
                                got: (pos - buffer_end) as usize - remaining,
                            });
                        }
                        Err(e) => return Err(e),
                    }
                }
                self.pos = pos;
            }
        }

        self.note_read_head();
        Ok(())
    }

    /// Sets a checkpoint at the current position and returns it.
    ///
    /// If a checkpoint was already set, buffered content before the
    /// current position is discarded first.
    pub fn set_checkpoint(&mut self) -> u64 {
        if let Some(cp) = self.checkpoint_pos {
            debug_assert!(cp <= self.pos, "checkpoint ahead of read head");
            if cp < self.pos {
                let drop = self.head_offset();
                self.buffer.drain(..drop);
                self.buffer_begin_pos = self.pos;
            }
        }
        self.checkpoint_pos = Some(self.pos);
        trace!(pos = self.pos, "checkpoint set");
        self.pos
    }

    /// Clears the checkpoint, moves the read head to the highest position
    /// read, and shrinks the buffer to begin at that position aligned
    /// down to the buffer-size grid.
    ///
    /// Fails with `Corrupt` when the buffer does not sit in the expected
    /// relation to the highest read position. NOTE: the guard rejects
    /// `buffer_end == highest_read_pos`, which a reader that consumed its
    /// input to an exact buffer boundary can legitimately produce; kept
    /// as-is pending a decision on the invariant.
    pub fn clear_checkpoint(&mut self) -> Result<()> {
        if self.checkpoint_pos.is_none() {
            return Ok(());
        }
        let buffer_end = self.buffer_end_pos();
        if buffer_end <= self.highest_read_pos
            || buffer_end - self.highest_read_pos > self.base_buffer_size as u64
        {
            return Err(ReadError::Corrupt("checkpoint buffer inconsistent"));
        }

        self.pos = self.highest_read_pos;
        let aligned = (self.pos & !(self.base_buffer_size as u64 - 1)).max(self.buffer_begin_pos);
        let drop = (aligned - self.buffer_begin_pos) as usize;
        self.buffer.drain(..drop);
        self.buffer_begin_pos = aligned;
        self.checkpoint_pos = None;
        trace!(pos = self.pos, "checkpoint cleared");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn head_offset(&self) -> usize {
        debug_assert!(self.pos >= self.buffer_begin_pos);
        (self.pos - self.buffer_begin_pos) as usize
    }

    fn buffer_end_pos(&self) -> u64 {
        self.buffer_begin_pos + self.buffer.len() as u64
    }

    fn note_read_head(&mut self) {
        self.highest_read_pos = self.highest_read_pos.max(self.pos);
    }

    fn quantize(&self, size: usize) -> usize {
        let base = self.base_buffer_size;
        (size.max(1)).div_ceil(base) * base
    }

    /// Refills the buffer with up to `num_bytes` (quantized) from the
    /// source. Without a checkpoint the buffer is replaced; with one it
    /// grows. Returns the number of bytes added; `EndOfFile` if none.
    fn refill(&mut self, num_bytes: usize) -> Result<usize> {
        let quantized = self.quantize(num_bytes);

        if self.checkpoint_pos.is_none() {
            debug_assert_eq!(
                self.head_offset(),
                self.buffer.len(),
                "refill without checkpoint requires an exhausted buffer"
            );
            self.buffer.resize(quantized, 0);
            let n = read_full(&mut self.source, &mut self.buffer)?;
            self.buffer.truncate(n);
            self.buffer_begin_pos = self.pos;
            if n == 0 {
                return Err(ReadError::EndOfFile);
            }
            Ok(n)
        } else {
            let old_len = self.buffer.len();
            self.buffer.resize(old_len + quantized, 0);
            let n = read_full(&mut self.source, &mut self.buffer[old_len..])?;
            self.buffer.truncate(old_len + n);
            if n == 0 {
                return Err(ReadError::EndOfFile);
            }
            Ok(n)
        }
    }

    /// Advances a non-seekable source to `target` by reading and
    /// discarding.
    fn discard_until(&mut self, target: u64) -> Result<()> {
        let mut remaining = target - self.buffer_end_pos();
        let mut scratch = vec![0u8; self.base_buffer_size];
        while remaining > 0 {
            let want = (remaining as usize).min(scratch.len());
            let n = read_full(&mut self.source, &mut scratch[..want])?;
            if n == 0 {
                return Err(ReadError::Truncated {
                    needed: (target - self.buffer_end_pos()) as usize,
                    got: ((target - self.buffer_end_pos()) - remaining) as usize,
                });
            }
            remaining -= n as u64;
        }
        Ok(())
    }
}

/// Reads until `buf` is full or the source reports end of stream.
fn read_full<S: Source>(source: &mut S, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0usize;
    while total < buf.len() {
        let n = source.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
