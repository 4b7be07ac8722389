//! The archive writer: single-writer ingestion of messages into files,
//! files into segments, and segments into a readable archive.
//!
//! Files are partitioned into two segment streams — files with
//! timestamps and files without — each with its own open segment and
//! accumulated logtype/variable ID sets. A segment opens lazily when the
//! first file is appended and seals once its staged uncompressed size
//! crosses the configured target (or at archive close).
//!
//! Sealing order is what makes a crash survivable: the segment's ID sets
//! go to the dictionary segment indexes, the segment file is written and
//! synced, the dictionaries flush, and only then are file rows persisted
//! and the stable sizes patched. A crash anywhere before the final patch
//! leaves the previous stable state; a crash after leaves the archive
//! fully readable.
//!
//! Lifecycle misuse (writing without an open file, closing with one
//! still open) panics; everything else returns `Result`.

use std::collections::BTreeSet;
use std::fs::File;
use std::mem;
use std::path::{Path, PathBuf};

use logcask_codec::encode_message;
use logcask_core::{
    Epoch, GroupId, LogtypeId, SegmentId, TimestampPattern, TimestampPatternSet, VariableId,
    EPOCH_MAX, EPOCH_MIN,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dictionary::{DictionaryWriter, LogtypeEntry, VariableEntry};
use crate::error::{ArchiveError, Result};
use crate::file::LogFile;
use crate::layout;
use crate::metadata::{
    ArchiveStats, FileMetadata, GlobalMetadataDb, MetadataDb, MetadataFileWriter,
    ARCHIVE_METADATA_SIZE,
};
use crate::segment::Segment;

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Directory under which the archive directory is created.
    pub output_dir: PathBuf,
    /// Archive ID; generated when absent.
    pub archive_id: Option<Uuid>,
    /// Seal a segment once its staged uncompressed size reaches this.
    pub target_segment_uncompressed_size: u64,
    /// zstd level for segments, dictionaries and their sidecars.
    pub compression_level: i32,
    pub logtype_dict_max_id: u64,
    pub var_dict_max_id: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            output_dir: PathBuf::from("."),
            archive_id: None,
            target_segment_uncompressed_size: 256 * 1024 * 1024,
            compression_level: logcask_io::compress::DEFAULT_COMPRESSION_LEVEL,
            logtype_dict_max_id: logcask_core::limits::LOGTYPE_DICT_ID_MAX,
            var_dict_max_id: logcask_core::limits::VARIABLE_DICT_ID_MAX,
        }
    }
}

/// One of the two pending segment streams.
#[derive(Default)]
struct SegmentBucket {
    segment: Option<Segment>,
    files: Vec<LogFile>,
    logtype_ids: BTreeSet<LogtypeId>,
    var_ids: BTreeSet<VariableId>,
}

impl SegmentBucket {
    fn prospective_segment_id(&self, next_segment_id: SegmentId) -> SegmentId {
        match &self.segment {
            Some(segment) => segment.id(),
            None => next_segment_id,
        }
    }
}

pub struct ArchiveWriter {
    id: Uuid,
    id_string: String,
    path: PathBuf,
    logs_dir: PathBuf,
    segments_dir: PathBuf,

    metadata_file: MetadataFileWriter,
    metadata_db: MetadataDb,
    global_db: Box<dyn GlobalMetadataDb>,

    logtype_dict: DictionaryWriter<LogtypeEntry>,
    var_dict: DictionaryWriter<VariableEntry>,

    pattern_set: TimestampPatternSet,

    current_file: Option<LogFile>,
    with_ts: SegmentBucket,
    without_ts: SegmentBucket,
    /// IDs of the current (pattern-less so far) file, merged into the
    /// chosen bucket when the file is placed.
    pending_logtype_ids: BTreeSet<LogtypeId>,
    pending_var_ids: BTreeSet<VariableId>,

    next_segment_id: SegmentId,
    target_segment_uncompressed_size: u64,
    compression_level: i32,

    /// Compressed bytes of sealed segments.
    stable_segments_size: u64,
    /// Uncompressed bytes of files in sealed segments.
    stable_uncompressed_size: u64,
    archive_begin_ts: Epoch,
    archive_end_ts: Epoch,

    /// Timestamp carried forward onto pattern-less lines.
    last_ts: Epoch,
}

impl ArchiveWriter {
    /// Creates the archive directory tree, the initial metadata header,
    /// both dictionaries, and the metadata DB row for this archive.
    /// Fails with `FileExists` if the directory is already present.
    pub fn open(
        config: WriterConfig,
        pattern_set: TimestampPatternSet,
        mut global_db: Box<dyn GlobalMetadataDb>,
    ) -> Result<Self> {
        let id = config.archive_id.unwrap_or_else(Uuid::new_v4);
        let id_string = id.to_string();
        let path = config.output_dir.join(&id_string);
        if path.exists() {
            return Err(ArchiveError::FileExists(path));
        }

        std::fs::create_dir_all(&path)?;
        let logs_dir = path.join(layout::LOGS_DIR);
        let segments_dir = path.join(layout::SEGMENTS_DIR);
        std::fs::create_dir(&logs_dir)?;
        std::fs::create_dir(&segments_dir)?;

        let metadata_file = MetadataFileWriter::create(&path.join(layout::METADATA_FILE))?;
        let metadata_db = MetadataDb::create(&path.join(layout::METADATA_DB_FILE))?;

        let logtype_dict = DictionaryWriter::open(
            &path.join(layout::LOGTYPE_DICT_FILE),
            &path.join(layout::LOGTYPE_SEGINDEX_FILE),
            config.logtype_dict_max_id,
            config.compression_level,
        )?;
        let var_dict = DictionaryWriter::open(
            &path.join(layout::VAR_DICT_FILE),
            &path.join(layout::VAR_SEGINDEX_FILE),
            config.var_dict_max_id,
            config.compression_level,
        )?;

        global_db.open()?;
        global_db.add_archive(&id_string, &ArchiveStats::default())?;
        global_db.close()?;

        // Flush the directory entries of everything just created
        File::open(&path)?.sync_all()?;

        info!(archive_id = %id_string, path = %path.display(), "archive opened for writing");

        Ok(ArchiveWriter {
            id,
            id_string,
            path,
            logs_dir,
            segments_dir,
            metadata_file,
            metadata_db,
            global_db,
            logtype_dict,
            var_dict,
            pattern_set,
            current_file: None,
            with_ts: SegmentBucket::default(),
            without_ts: SegmentBucket::default(),
            pending_logtype_ids: BTreeSet::new(),
            pending_var_ids: BTreeSet::new(),
            next_segment_id: 0,
            target_segment_uncompressed_size: config.target_segment_uncompressed_size,
            compression_level: config.compression_level,
            stable_segments_size: 0,
            stable_uncompressed_size: 0,
            archive_begin_ts: EPOCH_MAX,
            archive_end_ts: EPOCH_MIN,
            last_ts: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begins a fresh file. Panics if a file is already open.
    pub fn create_and_open_file(
        &mut self,
        orig_path: &str,
        group_id: GroupId,
        orig_file_id: Uuid,
        split_ix: u64,
    ) {
        assert!(
            self.current_file.is_none(),
            "create_and_open_file while a file is already open"
        );
        debug!(path = orig_path, split_ix, "file opened");
        self.current_file = Some(LogFile::new(orig_path, group_id, orig_file_id, split_ix));
        self.last_ts = 0;
    }

    /// Records a timestamp-pattern change for the current file. `None`
    /// means "no timestamp from here on".
    pub fn change_ts_pattern(&mut self, pattern: Option<&TimestampPattern>) {
        self.current_file
            .as_mut()
            .expect("change_ts_pattern with no open file")
            .change_ts_pattern(pattern);
    }

    /// Encodes and appends one message to the current file.
    pub fn write_msg(
        &mut self,
        timestamp: Epoch,
        text: &str,
        num_uncompressed_bytes: u64,
    ) -> Result<()> {
        let has_pattern = self
            .current_file
            .as_ref()
            .expect("write_msg with no open file")
            .has_ts_pattern();
        let segment_hint = if has_pattern {
            self.with_ts.prospective_segment_id(self.next_segment_id)
        } else {
            self.without_ts.prospective_segment_id(self.next_segment_id)
        };

        let var_dict = &mut self.var_dict;
        let encoded = encode_message(text, Some(segment_hint), |token| {
            var_dict
                .add_occurrence(token.as_bytes())
                .map(|(id, _)| id)
        })?;
        let (logtype_id, _) = self.logtype_dict.add_occurrence(&encoded.logtype)?;

        let file = self.current_file.as_mut().expect("file checked above");
        file.write_encoded_msg(
            timestamp,
            logtype_id,
            &encoded.encoded_vars,
            &encoded.dict_var_ids,
            num_uncompressed_bytes,
        );

        if has_pattern {
            self.with_ts.logtype_ids.insert(logtype_id);
            self.with_ts.var_ids.extend(encoded.dict_var_ids);
        } else {
            self.pending_logtype_ids.insert(logtype_id);
            self.pending_var_ids.extend(encoded.dict_var_ids);
        }
        Ok(())
    }

    /// Ingests one raw log line: recognizes a timestamp with the
    /// writer's pattern set, records pattern changes, and writes the
    /// stripped message. Lines without a recognizable timestamp carry
    /// the previous line's timestamp forward.
    pub fn ingest_line(&mut self, line: &str) -> Result<()> {
        let num_bytes = line.len() as u64 + 1;
        let matched = self
            .pattern_set
            .search(line)
            .map(|(pattern, ts, stripped)| (pattern.clone(), ts, stripped));

        match matched {
            Some((pattern, ts, stripped)) => {
                let current = self
                    .current_file
                    .as_ref()
                    .expect("ingest_line with no open file")
                    .current_ts_pattern();
                if current != Some(&pattern) {
                    self.change_ts_pattern(Some(&pattern));
                }
                self.last_ts = ts;
                self.write_msg(ts, &stripped, num_bytes)
            }
            None => {
                let had_pattern = self
                    .current_file
                    .as_ref()
                    .expect("ingest_line with no open file")
                    .current_ts_pattern()
                    .is_some();
                if had_pattern {
                    self.change_ts_pattern(None);
                }
                self.write_msg(self.last_ts, line, num_bytes)
            }
        }
    }

    /// Moves the current file into its segment stream, opening a fresh
    /// segment if needed and sealing the segment when it crosses the
    /// size target.
    pub fn append_file_to_segment(&mut self) -> Result<()> {
        let mut file = self
            .current_file
            .take()
            .expect("append_file_to_segment with no open file");
        let with_timestamps = file.has_ts_pattern();

        let pending_logtypes = mem::take(&mut self.pending_logtype_ids);
        let pending_vars = mem::take(&mut self.pending_var_ids);
        let next_segment_id = &mut self.next_segment_id;
        let bucket = if with_timestamps {
            &mut self.with_ts
        } else {
            &mut self.without_ts
        };
        bucket.logtype_ids.extend(pending_logtypes);
        bucket.var_ids.extend(pending_vars);

        let segment = bucket.segment.get_or_insert_with(|| {
            let id = *next_segment_id;
            *next_segment_id += 1;
            Segment::open(&self.segments_dir, id, self.compression_level)
        });
        file.append_to_segment(segment);
        let staged = segment.uncompressed_size();
        bucket.files.push(file);

        if staged >= self.target_segment_uncompressed_size {
            self.close_segment_and_persist_file_metadata(with_timestamps)?;
        }
        Ok(())
    }

    /// Seals the given segment stream: indexes its IDs, writes and syncs
    /// the segment, flushes the dictionaries, persists file metadata,
    /// and patches the stable sizes. A no-op when the stream has no open
    /// segment.
    pub fn close_segment_and_persist_file_metadata(
        &mut self,
        with_timestamps: bool,
    ) -> Result<()> {
        let (segment, mut files, logtype_ids, var_ids) = {
            let bucket = if with_timestamps {
                &mut self.with_ts
            } else {
                &mut self.without_ts
            };
            let Some(segment) = bucket.segment.take() else {
                debug_assert!(bucket.files.is_empty());
                return Ok(());
            };
            (
                segment,
                mem::take(&mut bucket.files),
                mem::take(&mut bucket.logtype_ids),
                mem::take(&mut bucket.var_ids),
            )
        };

        let segment_id = segment.id();
        self.logtype_dict.index_segment(segment_id, &logtype_ids)?;
        self.var_dict.index_segment(segment_id, &var_ids)?;

        let compressed_size = segment.close()?;
        self.stable_segments_size += compressed_size;
        File::open(&self.segments_dir)?.sync_all()?;

        self.logtype_dict.write_header_and_flush()?;
        self.var_dict.write_header_and_flush()?;

        let mut rows = Vec::with_capacity(files.len());
        for file in &mut files {
            file.mark_as_in_committed_segment();
            rows.push(FileMetadata::from_file(file));
        }

        self.metadata_db.add_files(&rows)?;
        self.global_db.open()?;
        self.global_db.add_files(&self.id_string, &rows)?;

        for file in &mut files {
            self.stable_uncompressed_size += file.num_uncompressed_bytes();
            if file.has_ts_pattern() {
                self.archive_begin_ts = self.archive_begin_ts.min(file.begin_ts());
                self.archive_end_ts = self.archive_end_ts.max(file.end_ts());
            }
            file.mark_metadata_as_clean();
        }

        self.update_metadata()?;
        self.global_db.close()?;

        info!(
            segment_id,
            num_files = rows.len(),
            with_timestamps,
            "segment sealed and file metadata persisted"
        );
        // Dropping `files` releases the last per-file memory
        Ok(())
    }

    /// Seals both segment streams, closes the dictionaries, and syncs
    /// the archive. Panics if a file is still open.
    pub fn close(mut self) -> Result<()> {
        assert!(
            self.current_file.is_none(),
            "archive closed while a file is still open"
        );

        self.close_segment_and_persist_file_metadata(true)?;
        self.close_segment_and_persist_file_metadata(false)?;

        // Flush new files' directory entries
        File::open(&self.logs_dir)?.sync_all()?;

        let logtype_size = self.logtype_dict.close()?;
        let var_size = self.var_dict.close()?;
        let stable_size =
            ARCHIVE_METADATA_SIZE + self.stable_segments_size + logtype_size + var_size;
        self.metadata_file
            .update_stable_sizes(self.stable_uncompressed_size, stable_size)?;
        self.global_db.open()?;
        self.global_db.update_archive_size(
            &self.id_string,
            &ArchiveStats {
                uncompressed_size: self.stable_uncompressed_size,
                size: stable_size,
                begin_ts: self.archive_begin_ts,
                end_ts: self.archive_end_ts,
            },
        )?;
        self.global_db.close()?;

        File::open(&self.path)?.sync_all()?;
        info!(archive_id = %self.id_string, "archive closed");
        Ok(())
    }

    /// Records empty input directories so extraction can recreate them.
    pub fn add_empty_directories(&mut self, paths: &[String]) -> Result<()> {
        self.metadata_db.add_empty_directories(paths)
    }

    fn update_metadata(&mut self) -> Result<()> {
        let stable_size = ARCHIVE_METADATA_SIZE
            + self.stable_segments_size
            + self.logtype_dict.on_disk_size()
            + self.var_dict.on_disk_size();
        self.metadata_file
            .update_stable_sizes(self.stable_uncompressed_size, stable_size)?;
        self.global_db
            .update_archive_size(
                &self.id_string,
                &ArchiveStats {
                    uncompressed_size: self.stable_uncompressed_size,
                    size: stable_size,
                    begin_ts: self.archive_begin_ts,
                    end_ts: self.archive_end_ts,
                },
            )
            .map_err(|e| {
                warn!(error = %e, "global metadata size update failed");
                e
            })
    }
}
