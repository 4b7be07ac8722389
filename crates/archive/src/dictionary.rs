//! Logtype and variable dictionaries.
//!
//! Both dictionaries share one shape: a dense map from value bytes to a
//! monotonically assigned ID, an on-disk file of length-prefixed entries
//! behind a streaming compressor, and a segment-index sidecar recording
//! which segments reference which IDs.
//!
//! # Dictionary file layout
//!
//! ```text
//! ┌───────────────────────────────┐
//! │ entry count (u64 LE, plain)   │  patched in place on flush
//! ├───────────────────────────────┤
//! │ zstd stream of entries        │  appended as entries are added
//! └───────────────────────────────┘
//! ```
//!
//! Entry formats (inside the compressed stream, little-endian):
//!
//! - variable entry: `id:u64, byte_length:u32, bytes`
//! - logtype entry:  `id:u64, byte_length:u32, bytes,
//!   num_placeholders:u32, placeholder_positions:[u32]`
//!
//! # Segment-index sidecar
//!
//! One zstd stream of `(segment_id:u64, num_ids:u32, ids:[u64])`
//! records, appended each time a segment seals. Readers materialize the
//! records into per-entry segment sets.
//!
//! A dictionary is owned by exactly one writer during ingestion; readers
//! open a read-only view after the writer has flushed.

use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use logcask_codec::placeholder_positions;
use logcask_core::wildcard::wildcard_match_bytes;
use logcask_core::SegmentId;
use logcask_io::{ReadError, ZstdCompressor, ZstdDecompressor};
use tracing::debug;

use crate::error::{ArchiveError, Result};

/// Size of the plain entry-count header at the front of a dictionary
/// file.
pub const DICT_HEADER_SIZE: u64 = 8;

/// One dictionary entry's codec.
pub trait DictEntry: Sized {
    fn new(id: u64, value: Vec<u8>) -> Self;
    fn id(&self) -> u64;
    fn value(&self) -> &[u8];
    fn write_to(&self, compressor: &mut ZstdCompressor) -> Result<()>;
    fn read_from(decompressor: &mut ZstdDecompressor) -> Result<Self>;
}

/// A variable dictionary entry: the literal token bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub id: u64,
    pub value: Vec<u8>,
}

impl DictEntry for VariableEntry {
    fn new(id: u64, value: Vec<u8>) -> Self {
        VariableEntry { id, value }
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn write_to(&self, compressor: &mut ZstdCompressor) -> Result<()> {
        compressor.write(&self.id.to_le_bytes())?;
        compressor.write(&(self.value.len() as u32).to_le_bytes())?;
        compressor.write(&self.value)?;
        Ok(())
    }

    fn read_from(decompressor: &mut ZstdDecompressor) -> Result<Self> {
        let id = decompressor.read_u64_le()?;
        let len = decompressor.read_u32_le()? as usize;
        let value = decompressor.read_vec(len)?;
        Ok(VariableEntry { id, value })
    }
}

/// A logtype dictionary entry: the logtype bytes plus the positions of
/// its placeholder bytes, stored so message replay need not rescan the
/// logtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogtypeEntry {
    pub id: u64,
    pub value: Vec<u8>,
    pub placeholder_positions: Vec<u32>,
}

impl LogtypeEntry {
    /// Number of variables a message of this logtype carries.
    pub fn num_variables(&self) -> usize {
        self.placeholder_positions.len()
    }
}

impl DictEntry for LogtypeEntry {
    fn new(id: u64, value: Vec<u8>) -> Self {
        let placeholder_positions = placeholder_positions(&value);
        LogtypeEntry {
            id,
            value,
            placeholder_positions,
        }
    }

    fn id(&self) -> u64 {
        self.id
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn write_to(&self, compressor: &mut ZstdCompressor) -> Result<()> {
        compressor.write(&self.id.to_le_bytes())?;
        compressor.write(&(self.value.len() as u32).to_le_bytes())?;
        compressor.write(&self.value)?;
        compressor.write(&(self.placeholder_positions.len() as u32).to_le_bytes())?;
        for pos in &self.placeholder_positions {
            compressor.write(&pos.to_le_bytes())?;
        }
        Ok(())
    }

    fn read_from(decompressor: &mut ZstdDecompressor) -> Result<Self> {
        let id = decompressor.read_u64_le()?;
        let len = decompressor.read_u32_le()? as usize;
        let value = decompressor.read_vec(len)?;
        let num_positions = decompressor.read_u32_le()? as usize;
        let mut placeholder_positions = Vec::with_capacity(num_positions);
        for _ in 0..num_positions {
            placeholder_positions.push(decompressor.read_u32_le()?);
        }
        Ok(LogtypeEntry {
            id,
            value,
            placeholder_positions,
        })
    }
}

// ---------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------

pub struct DictionaryWriter<E: DictEntry> {
    value_to_id: HashMap<Vec<u8>, u64>,
    next_id: u64,
    max_id: u64,
    entry_compressor: ZstdCompressor,
    /// Second handle on the dictionary file, used to patch the entry
    /// count at offset 0 without disturbing the compressor's append
    /// position.
    header_handle: File,
    segindex_compressor: ZstdCompressor,
    _entry: std::marker::PhantomData<E>,
}

impl<E: DictEntry> DictionaryWriter<E> {
    /// Opens a dictionary for writing, preloading existing entries when
    /// the backing file already holds some. Fails with `OutOfBounds` if
    /// the existing content exceeds `max_id`. `compression_level`
    /// applies to both the entry stream and the segment-index sidecar.
    pub fn open(
        dict_path: &Path,
        segindex_path: &Path,
        max_id: u64,
        compression_level: i32,
    ) -> Result<Self> {
        let mut value_to_id = HashMap::new();
        let mut next_id = 0u64;

        if dict_path.exists() {
            let mut file = File::open(dict_path)?;
            let count = read_header(&mut file)?;
            if count > 0 {
                let mut decompressor = ZstdDecompressor::open(file)?;
                for _ in 0..count {
                    let entry = E::read_from(&mut decompressor)?;
                    next_id = next_id.max(entry.id() + 1);
                    value_to_id.insert(entry.value().to_vec(), entry.id());
                }
            }
            if next_id > 0 && next_id - 1 > max_id {
                return Err(ArchiveError::OutOfBounds(max_id));
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dict_path)?;
        if file.metadata()?.len() < DICT_HEADER_SIZE {
            file.write_all(&0u64.to_le_bytes())?;
        } else {
            file.seek(SeekFrom::End(0))?;
        }
        // Independent descriptor for header patches: a cloned handle
        // would share the append cursor with the compressor
        let header_handle = OpenOptions::new().write(true).open(dict_path)?;
        let entry_compressor = ZstdCompressor::open(file, compression_level)?;

        let mut segindex_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(segindex_path)?;
        segindex_file.seek(SeekFrom::End(0))?;
        let segindex_compressor = ZstdCompressor::open(segindex_file, compression_level)?;

        debug!(path = %dict_path.display(), entries = value_to_id.len(), "dictionary opened");

        Ok(DictionaryWriter {
            value_to_id,
            next_id,
            max_id,
            entry_compressor,
            header_handle,
            segindex_compressor,
            _entry: std::marker::PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.value_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value_to_id.is_empty()
    }

    /// Returns the ID for `value`, assigning and persisting a fresh
    /// entry when the value is new. The boolean is true for new entries.
    pub fn add_occurrence(&mut self, value: &[u8]) -> Result<(u64, bool)> {
        if let Some(&id) = self.value_to_id.get(value) {
            return Ok((id, false));
        }

        if self.next_id > self.max_id {
            return Err(ArchiveError::OutOfBounds(self.max_id));
        }
        let id = self.next_id;
        self.next_id += 1;

        let entry = E::new(id, value.to_vec());
        entry.write_to(&mut self.entry_compressor)?;
        self.value_to_id.insert(value.to_vec(), id);
        Ok((id, true))
    }

    /// Records that `segment_id` references every ID in `ids`, appending
    /// one record to the segment-index sidecar.
    pub fn index_segment(&mut self, segment_id: SegmentId, ids: &BTreeSet<u64>) -> Result<()> {
        self.segindex_compressor.write(&segment_id.to_le_bytes())?;
        self.segindex_compressor
            .write(&(ids.len() as u32).to_le_bytes())?;
        for id in ids {
            self.segindex_compressor.write(&id.to_le_bytes())?;
        }
        Ok(())
    }

    /// Rewrites the entry-count header and forces both compressed
    /// streams to a frame boundary, so a reader opened afterwards can
    /// decode everything appended so far.
    pub fn write_header_and_flush(&mut self) -> Result<()> {
        self.entry_compressor.end_frame()?;
        self.segindex_compressor.end_frame()?;

        self.header_handle.seek(SeekFrom::Start(0))?;
        self.header_handle
            .write_all(&(self.value_to_id.len() as u64).to_le_bytes())?;
        self.header_handle.sync_all()?;
        Ok(())
    }

    /// Compressed bytes currently on disk for this dictionary and its
    /// sidecar.
    pub fn on_disk_size(&self) -> u64 {
        DICT_HEADER_SIZE
            + self.entry_compressor.compressed_size()
            + self.segindex_compressor.compressed_size()
    }

    /// Flushes the header, terminates both compressed streams, and
    /// returns the final on-disk size.
    pub fn close(mut self) -> Result<u64> {
        self.write_header_and_flush()?;
        let (file, entry_size) = self.entry_compressor.finish()?;
        file.sync_all()?;
        let (segindex, segindex_size) = self.segindex_compressor.finish()?;
        segindex.sync_all()?;
        Ok(DICT_HEADER_SIZE + entry_size + segindex_size)
    }
}

fn read_header(file: &mut File) -> Result<u64> {
    use std::io::Read;
    let mut header = [0u8; DICT_HEADER_SIZE as usize];
    file.read_exact(&mut header)
        .map_err(|_| ArchiveError::Corrupt("dictionary header too short".into()))?;
    Ok(u64::from_le_bytes(header))
}

// ---------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------

/// Read-only view of a dictionary plus its materialized segment index.
pub struct DictionaryReader<E: DictEntry> {
    /// Entries indexed by ID (IDs are dense).
    entries: Vec<E>,
    value_to_id: HashMap<Vec<u8>, u64>,
    /// Per-entry segment sets, indexed by ID.
    segments: Vec<BTreeSet<SegmentId>>,
}

impl<E: DictEntry> DictionaryReader<E> {
    pub fn open(dict_path: &Path, segindex_path: &Path) -> Result<Self> {
        let mut file =
            File::open(dict_path).map_err(|_| ArchiveError::NotFound(dict_path.to_path_buf()))?;
        let count = read_header(&mut file)? as usize;

        let mut entries: Vec<E> = Vec::with_capacity(count);
        if count > 0 {
            let mut decompressor = ZstdDecompressor::open(file)?;
            for i in 0..count {
                let entry = E::read_from(&mut decompressor)?;
                if entry.id() as usize != i {
                    return Err(ArchiveError::Corrupt(format!(
                        "dictionary IDs not dense: expected {}, found {}",
                        i,
                        entry.id()
                    )));
                }
                entries.push(entry);
            }
        }

        let mut value_to_id = HashMap::with_capacity(entries.len());
        for entry in &entries {
            value_to_id.insert(entry.value().to_vec(), entry.id());
        }

        let mut segments = vec![BTreeSet::new(); entries.len()];
        let segindex_len = std::fs::metadata(segindex_path).map(|m| m.len()).unwrap_or(0);
        if segindex_len > 0 {
            let mut decompressor = ZstdDecompressor::open_path(segindex_path)?;
            loop {
                let segment_id = match decompressor.read_u64_le() {
                    Ok(v) => v,
                    Err(ReadError::EndOfFile) => break,
                    Err(e) => return Err(e.into()),
                };
                let num_ids = decompressor.read_u32_le()? as usize;
                for _ in 0..num_ids {
                    let id = decompressor.read_u64_le()? as usize;
                    if id >= segments.len() {
                        return Err(ArchiveError::Corrupt(format!(
                            "segment index references unknown entry {}",
                            id
                        )));
                    }
                    segments[id].insert(segment_id);
                }
            }
        }

        Ok(DictionaryReader {
            entries,
            value_to_id,
            segments,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&E> {
        self.entries.get(id as usize)
    }

    pub fn get_by_value(&self, value: &[u8]) -> Option<&E> {
        self.value_to_id
            .get(value)
            .and_then(|&id| self.get(id))
    }

    /// Segments that reference entry `id`.
    pub fn segments_of(&self, id: u64) -> Option<&BTreeSet<SegmentId>> {
        self.segments.get(id as usize)
    }

    /// Every entry whose value matches the wildcard `pattern`.
    /// Placeholder bytes inside stored values are ordinary bytes here;
    /// only `*` and `?` in the pattern act as wildcards.
    pub fn entries_matching_wildcard(&self, pattern: &[u8], ignore_case: bool) -> Vec<&E> {
        self.entries
            .iter()
            .filter(|e| wildcard_match_bytes(e.value(), pattern, !ignore_case))
            .collect()
    }
}
