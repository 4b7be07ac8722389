//! Byte-stream substrate for the logcask archive.
//!
//! Three layers live here:
//!
//! - [`source`]: the `Source` capability — a forward-readable byte stream
//!   that may or may not support native seeking (a local file does, a
//!   chunked object-store stream does not).
//! - [`buffered`]: `BufferedReader`, which wraps any `Source` and adds
//!   controlled buffering with a *checkpoint*: a sticky position marker
//!   that guarantees every byte read since the mark stays available for
//!   seek-back until the checkpoint is cleared.
//! - [`compress`]: thin streaming zstd wrappers with position tracking,
//!   used by dictionaries, segment files and their sidecars.

pub mod buffered;
pub mod compress;
pub mod error;
pub mod source;

pub use buffered::BufferedReader;
pub use compress::{ZstdCompressor, ZstdDecompressor};
pub use error::ReadError;
pub use source::{FileSource, ForwardOnly, MemorySource, Source};
