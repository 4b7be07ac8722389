//! Segments: sealed compressed column stores.
//!
//! A segment holds three logical columns — timestamps, logtype IDs,
//! encoded variables — concatenated from every file appended to it. On
//! disk a segment is a single zstd stream laid out column-major:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ timestamps column   (i64 LE × total msgs)    │  file slices back-to-back
//! ├──────────────────────────────────────────────┤
//! │ logtype-ID column   (u64 LE × total msgs)    │
//! ├──────────────────────────────────────────────┤
//! │ encoded-var column  (i64 LE × total vars)    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Per-file positions into the columns are *element* offsets, recorded
//! in the archive's metadata DB; the segment file itself carries no
//! framing. Columns are staged in memory while the segment is open and
//! written as one stream when it seals, after which the segment is
//! immutable and its ID is never reused.

use std::fs::File;
use std::path::{Path, PathBuf};

use logcask_core::{Epoch, LogtypeId, SegmentId};
use logcask_io::{ZstdCompressor, ZstdDecompressor};
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};

/// Writer-side segment: accumulates columns until sealed.
pub struct Segment {
    id: SegmentId,
    path: PathBuf,
    compression_level: i32,
    timestamps: Vec<Epoch>,
    logtype_ids: Vec<LogtypeId>,
    variables: Vec<i64>,
}

/// Element offsets of a file's slices within a segment's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnPositions {
    pub ts_pos: u64,
    pub logtype_pos: u64,
    pub var_pos: u64,
}

impl Segment {
    /// Opens a fresh segment with the given ID under `segments_dir`.
    pub fn open(segments_dir: &Path, id: SegmentId, compression_level: i32) -> Self {
        debug!(segment_id = id, "segment opened");
        Segment {
            id,
            path: segments_dir.join(id.to_string()),
            compression_level,
            timestamps: Vec::new(),
            logtype_ids: Vec::new(),
            variables: Vec::new(),
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Appends one file's columns, returning the element offsets at
    /// which its slices begin.
    pub fn append_file_columns(
        &mut self,
        timestamps: &[Epoch],
        logtype_ids: &[LogtypeId],
        variables: &[i64],
    ) -> ColumnPositions {
        assert_eq!(
            timestamps.len(),
            logtype_ids.len(),
            "timestamp and logtype columns must stay parallel"
        );
        let positions = ColumnPositions {
            ts_pos: self.timestamps.len() as u64,
            logtype_pos: self.logtype_ids.len() as u64,
            var_pos: self.variables.len() as u64,
        };
        self.timestamps.extend_from_slice(timestamps);
        self.logtype_ids.extend_from_slice(logtype_ids);
        self.variables.extend_from_slice(variables);
        positions
    }

    /// Uncompressed size of the staged columns in bytes.
    pub fn uncompressed_size(&self) -> u64 {
        ((self.timestamps.len() + self.logtype_ids.len() + self.variables.len()) * 8) as u64
    }

    /// Seals the segment: writes the column stream, syncs the file, and
    /// returns the compressed size.
    pub fn close(self) -> Result<u64> {
        let file = File::create(&self.path)?;
        let mut compressor = ZstdCompressor::open(file, self.compression_level)?;
        for ts in &self.timestamps {
            compressor.write(&ts.to_le_bytes())?;
        }
        for id in &self.logtype_ids {
            compressor.write(&id.to_le_bytes())?;
        }
        for var in &self.variables {
            compressor.write(&var.to_le_bytes())?;
        }
        let uncompressed = compressor.uncompressed_pos();
        let (file, compressed) = compressor.finish()?;
        file.sync_all()?;
        info!(
            segment_id = self.id,
            uncompressed, compressed, "segment sealed"
        );
        Ok(compressed)
    }
}

/// Reader-side segment: the three columns decoded into memory.
pub struct SegmentReader {
    pub timestamps: Vec<Epoch>,
    pub logtype_ids: Vec<LogtypeId>,
    pub variables: Vec<i64>,
}

impl SegmentReader {
    /// Opens a sealed segment. `total_messages` and `total_variables`
    /// are the column lengths recorded across the segment's files; they
    /// determine where one column ends and the next begins.
    pub fn open(path: &Path, total_messages: u64, total_variables: u64) -> Result<Self> {
        let mut decompressor = ZstdDecompressor::open_path(path)
            .map_err(|_| ArchiveError::NotFound(path.to_path_buf()))?;

        let n_msgs = total_messages as usize;
        let n_vars = total_variables as usize;

        let mut timestamps = Vec::with_capacity(n_msgs);
        for _ in 0..n_msgs {
            timestamps.push(decompressor.read_i64_le()?);
        }
        let mut logtype_ids = Vec::with_capacity(n_msgs);
        for _ in 0..n_msgs {
            logtype_ids.push(decompressor.read_u64_le()?);
        }
        let mut variables = Vec::with_capacity(n_vars);
        for _ in 0..n_vars {
            variables.push(decompressor.read_i64_le()?);
        }

        Ok(SegmentReader {
            timestamps,
            logtype_ids,
            variables,
        })
    }
}
