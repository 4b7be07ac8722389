//! IR codec error codes.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IrError {
    /// The buffer does not (yet) hold enough bytes; the cursor was not
    /// advanced, so the caller may retry after supplying more data.
    #[error("incomplete IR: more bytes required")]
    IncompleteIr,

    /// The stream violates the protocol (bad magic, unknown tag, event
    /// out of order).
    #[error("corrupted IR stream")]
    CorruptedIr,

    /// The preamble's metadata could not be parsed or lacks required
    /// keys.
    #[error("corrupted IR metadata")]
    CorruptedMetadata,

    /// The stream declares a version this implementation does not
    /// support.
    #[error("unsupported IR version: {0}")]
    UnsupportedVersion(String),

    /// The event payload is well-framed but cannot be decoded into a
    /// message (bad UTF-8, variable-count mismatch).
    #[error("IR decode error: {0}")]
    DecodeError(String),

    /// Clean end of stream: the end-of-IR tag was read.
    #[error("end of IR stream")]
    Eof,
}

impl From<logcask_codec::DecodeError> for IrError {
    fn from(e: logcask_codec::DecodeError) -> Self {
        IrError::DecodeError(e.to_string())
    }
}
