//! The archive reader: read-only access to a closed archive.
//!
//! Opening validates the metadata header, loads both dictionary views
//! (with their segment indexes) and the per-archive file rows. Only
//! files whose metadata rows were persisted are visible, which is what
//! makes crash orphans invisible: an unsealed segment has no rows.
//!
//! Segments load lazily on first use and stay cached; the open counter
//! exists so pruning behavior is observable from tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use logcask_codec::decode_message;
use logcask_core::{Epoch, LogtypeId, SegmentId, TimestampPattern};
use tracing::debug;

use crate::dictionary::{DictionaryReader, LogtypeEntry, VariableEntry};
use crate::error::{ArchiveError, Result};
use crate::layout;
use crate::metadata::{ArchiveMetadata, FileMetadata, MetadataDb};
use crate::segment::SegmentReader;

/// One message read back from a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub timestamp: Epoch,
    pub logtype_id: LogtypeId,
    pub encoded_vars: Vec<i64>,
    /// Index of this message within its file.
    pub msg_ix: u64,
}

/// Cursor state over one file's slices of its segment's columns.
pub struct OpenFile {
    meta: FileMetadata,
    msg_ix: u64,
    /// Absolute element index into the segment's variable column.
    var_ix: u64,
    patterns: Vec<(u64, Option<TimestampPattern>)>,
}

impl OpenFile {
    pub fn metadata(&self) -> &FileMetadata {
        &self.meta
    }

    /// The pattern in effect for message `msg_ix`.
    pub fn pattern_for(&self, msg_ix: u64) -> Option<&TimestampPattern> {
        self.patterns
            .iter()
            .rev()
            .find(|(change_ix, _)| *change_ix <= msg_ix)
            .and_then(|(_, p)| p.as_ref())
    }
}

/// Parses the newline-separated `message_ix:num_spaces:format` records
/// from a metadata row.
pub fn parse_encoded_timestamp_patterns(
    encoded: &str,
) -> Result<Vec<(u64, Option<TimestampPattern>)>> {
    let mut patterns = Vec::new();
    for line in encoded.lines() {
        let mut parts = line.splitn(3, ':');
        let (Some(ix), Some(spaces), Some(format)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ArchiveError::Corrupt(format!(
                "malformed timestamp pattern record: {line:?}"
            )));
        };
        let msg_ix: u64 = ix
            .parse()
            .map_err(|_| ArchiveError::Corrupt(format!("bad pattern index: {line:?}")))?;
        let num_spaces: u32 = spaces
            .parse()
            .map_err(|_| ArchiveError::Corrupt(format!("bad pattern spaces: {line:?}")))?;
        let pattern = if format.is_empty() {
            None
        } else {
            Some(TimestampPattern::new(num_spaces, format))
        };
        patterns.push((msg_ix, pattern));
    }
    Ok(patterns)
}

pub struct ArchiveReader {
    path: PathBuf,
    metadata: ArchiveMetadata,
    logtype_dict: DictionaryReader<LogtypeEntry>,
    var_dict: DictionaryReader<VariableEntry>,
    files: Vec<FileMetadata>,
    /// Total (messages, variables) per segment, derived from file rows;
    /// needed to split a segment's single stream into its columns.
    segment_totals: HashMap<SegmentId, (u64, u64)>,
    segments: HashMap<SegmentId, SegmentReader>,
    segment_open_count: usize,
}

impl ArchiveReader {
    pub fn open(archive_path: &Path) -> Result<Self> {
        let metadata = ArchiveMetadata::read(&archive_path.join(layout::METADATA_FILE))?;

        let logtype_dict = DictionaryReader::open(
            &archive_path.join(layout::LOGTYPE_DICT_FILE),
            &archive_path.join(layout::LOGTYPE_SEGINDEX_FILE),
        )?;
        let var_dict = DictionaryReader::open(
            &archive_path.join(layout::VAR_DICT_FILE),
            &archive_path.join(layout::VAR_SEGINDEX_FILE),
        )?;

        let db = MetadataDb::open(&archive_path.join(layout::METADATA_DB_FILE))?;
        let files = db.files().to_vec();

        let mut segment_totals: HashMap<SegmentId, (u64, u64)> = HashMap::new();
        for file in &files {
            let entry = segment_totals.entry(file.segment_id).or_default();
            entry.0 += file.num_messages;
            entry.1 += file.num_variables;
        }

        debug!(
            path = %archive_path.display(),
            num_files = files.len(),
            num_logtypes = logtype_dict.len(),
            num_vars = var_dict.len(),
            "archive opened for reading"
        );

        Ok(ArchiveReader {
            path: archive_path.to_path_buf(),
            metadata,
            logtype_dict,
            var_dict,
            files,
            segment_totals,
            segments: HashMap::new(),
            segment_open_count: 0,
        })
    }

    pub fn metadata(&self) -> ArchiveMetadata {
        self.metadata
    }

    pub fn files(&self) -> &[FileMetadata] {
        &self.files
    }

    pub fn logtype_dict(&self) -> &DictionaryReader<LogtypeEntry> {
        &self.logtype_dict
    }

    pub fn var_dict(&self) -> &DictionaryReader<VariableEntry> {
        &self.var_dict
    }

    /// How many distinct segments have been opened so far.
    pub fn segment_open_count(&self) -> usize {
        self.segment_open_count
    }

    /// Positions cursors at the start of `meta`'s column slices, loading
    /// the segment if needed.
    pub fn open_file(&mut self, meta: &FileMetadata) -> Result<OpenFile> {
        self.load_segment(meta.segment_id)?;
        let patterns = parse_encoded_timestamp_patterns(&meta.encoded_timestamp_patterns)?;
        Ok(OpenFile {
            meta: meta.clone(),
            msg_ix: 0,
            var_ix: meta.var_pos_in_segment,
            patterns,
        })
    }

    /// Reads the next message of `file`, or `None` past the last.
    pub fn next_message(&mut self, file: &mut OpenFile) -> Result<Option<Message>> {
        if file.msg_ix >= file.meta.num_messages {
            return Ok(None);
        }
        self.load_segment(file.meta.segment_id)?;
        let segment = &self.segments[&file.meta.segment_id];

        let ts_ix = (file.meta.ts_pos_in_segment + file.msg_ix) as usize;
        let logtype_ix = (file.meta.logtype_pos_in_segment + file.msg_ix) as usize;
        let timestamp = *segment
            .timestamps
            .get(ts_ix)
            .ok_or_else(|| ArchiveError::Corrupt("timestamp column too short".into()))?;
        let logtype_id = *segment
            .logtype_ids
            .get(logtype_ix)
            .ok_or_else(|| ArchiveError::Corrupt("logtype column too short".into()))?;

        let num_vars = self
            .logtype_dict
            .get(logtype_id)
            .ok_or_else(|| {
                ArchiveError::Corrupt(format!("segment references unknown logtype {logtype_id}"))
            })?
            .num_variables() as u64;
        let var_begin = file.var_ix as usize;
        let var_end = (file.var_ix + num_vars) as usize;
        let encoded_vars = segment
            .variables
            .get(var_begin..var_end)
            .ok_or_else(|| ArchiveError::Corrupt("variable column too short".into()))?
            .to_vec();

        let msg_ix = file.msg_ix;
        file.msg_ix += 1;
        file.var_ix += num_vars;

        Ok(Some(Message {
            timestamp,
            logtype_id,
            encoded_vars,
            msg_ix,
        }))
    }

    /// Reads forward until a message whose timestamp falls inside
    /// `[begin_ts, end_ts]`.
    pub fn find_message_in_time_range(
        &mut self,
        file: &mut OpenFile,
        begin_ts: Epoch,
        end_ts: Epoch,
    ) -> Result<Option<Message>> {
        while let Some(message) = self.next_message(file)? {
            if message.timestamp >= begin_ts && message.timestamp <= end_ts {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Reconstructs a message's text from its logtype and variables.
    pub fn decompress_message(&self, message: &Message) -> Result<String> {
        let entry = self.logtype_dict.get(message.logtype_id).ok_or_else(|| {
            ArchiveError::Corrupt(format!("unknown logtype {}", message.logtype_id))
        })?;
        let var_dict = &self.var_dict;
        let text = decode_message(&entry.value, &message.encoded_vars, |id| {
            var_dict
                .get(id)
                .and_then(|e| String::from_utf8(e.value.clone()).ok())
        })?;
        Ok(text)
    }

    /// Decompresses every message of `meta` in order, re-inserting
    /// formatted timestamps per the file's pattern records, and hands
    /// each line to `out`.
    pub fn extract_file(
        &mut self,
        meta: &FileMetadata,
        mut out: impl FnMut(&str),
    ) -> Result<u64> {
        let mut file = self.open_file(meta)?;
        let mut count = 0u64;
        while let Some(message) = self.next_message(&mut file)? {
            let text = self.decompress_message(&message)?;
            match file.pattern_for(message.msg_ix) {
                Some(pattern) => out(&pattern.insert_formatted(message.timestamp, &text)),
                None => out(&text),
            }
            count += 1;
        }
        Ok(count)
    }

    fn load_segment(&mut self, segment_id: SegmentId) -> Result<()> {
        if self.segments.contains_key(&segment_id) {
            return Ok(());
        }
        let &(total_messages, total_variables) =
            self.segment_totals.get(&segment_id).ok_or_else(|| {
                ArchiveError::Corrupt(format!("no metadata for segment {segment_id}"))
            })?;
        let path = self
            .path
            .join(layout::SEGMENTS_DIR)
            .join(segment_id.to_string());
        let segment = SegmentReader::open(&path, total_messages, total_variables)?;
        self.segment_open_count += 1;
        debug!(segment_id, "segment loaded");
        self.segments.insert(segment_id, segment);
        Ok(())
    }
}
