//! Error type for byte-stream operations.
//!
//! Recoverable I/O and protocol failures are values of [`ReadError`];
//! lifecycle misuse (for example writing through a compressor that has
//! already been finished) panics instead of returning an error. The
//! "not initialized" / "not ready" states of the original error taxonomy
//! are unrepresentable here because readers and compressors own their
//! stream from construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    /// Malformed argument: zero, non-power-of-two or unaligned buffer
    /// size, empty read request, and similar.
    #[error("bad parameter: {0}")]
    BadParam(&'static str),

    /// Clean end of input.
    #[error("end of file")]
    EndOfFile,

    /// Seek before the checkpoint, seek backward without a checkpoint,
    /// or a position outside the addressable range.
    #[error("position out of bounds: {0}")]
    OutOfBounds(u64),

    /// Fewer bytes were available than the operation required.
    #[error("truncated: needed {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// An internal buffer invariant does not hold.
    #[error("corrupt stream state: {0}")]
    Corrupt(&'static str),

    /// The underlying source does not implement the operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReadError>;
