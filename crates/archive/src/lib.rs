//! The logcask archive engine: dictionary-encoded, columnar,
//! segment-oriented storage for factored log messages.
//!
//! Writing: [`writer::ArchiveWriter`] accepts messages, factors them
//! through the codec and dictionaries, and builds files and segments
//! with crash-consistent metadata. Reading: [`reader::ArchiveReader`]
//! opens a closed archive and serves per-file message iteration with
//! segment-level pruning metadata for the query planner.

pub mod dictionary;
pub mod error;
pub mod file;
pub mod ir_ingest;
pub mod layout;
pub mod metadata;
pub mod reader;
pub mod segment;
pub mod writer;

pub use dictionary::{DictionaryReader, DictionaryWriter, LogtypeEntry, VariableEntry};
pub use error::{ArchiveError, Result};
pub use ir_ingest::ingest_ir_stream;
pub use metadata::{
    ArchiveMetadata, ArchiveStats, FileMetadata, GlobalMetadataDb, InMemoryGlobalMetadataDb,
    JsonGlobalMetadataDb,
};
pub use reader::{ArchiveReader, Message, OpenFile};
pub use writer::{ArchiveWriter, WriterConfig};
