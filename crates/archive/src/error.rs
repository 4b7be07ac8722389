//! Archive error type.
//!
//! Recoverable failures only; lifecycle misuse (writing a message with
//! no file open, closing with a file still open) panics at the call
//! site.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The archive directory already exists.
    #[error("archive path already exists: {0}")]
    FileExists(PathBuf),

    /// A required file or directory is missing.
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// A dictionary ran out of IDs.
    #[error("dictionary ID space exhausted (max id {0})")]
    OutOfBounds(u64),

    /// An on-disk invariant does not hold.
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// The metadata DB location could not be understood.
    #[error("bad metadata DB uri: {0}")]
    DbBadUri(String),

    /// A bulk write to the metadata DB failed.
    #[error("metadata DB bulk write failed: {0}")]
    DbBulkWriteFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Read(#[from] logcask_io::ReadError),

    #[error(transparent)]
    Decode(#[from] logcask_codec::DecodeError),

    #[error("ir stream error: {0}")]
    Ir(#[from] logcask_ir::IrError),

    #[error("metadata serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
