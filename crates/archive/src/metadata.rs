//! Archive metadata: the fixed-size header file, the per-archive
//! metadata DB, and the global metadata DB capability.
//!
//! # `metadata` header (20 bytes, little-endian)
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ format_version            u32      │
//! │ stable_uncompressed_size  u64      │
//! │ stable_size               u64      │
//! └────────────────────────────────────┘
//! ```
//!
//! The stable sizes cover sealed data only; they are patched in place
//! each time a segment seals, so a reader opening after a crash sees
//! exactly the last stable state and ignores orphan segments.
//!
//! # `metadata.db`
//!
//! A serde document of per-file rows and empty-directory rows, persisted
//! with write-fsync-rename so it is either the previous or the next
//! stable version, never a torn one.
//!
//! # Global metadata DB
//!
//! A capability trait: the archive registers itself and its files with
//! whatever implementation the embedder supplies. A JSON-file
//! implementation and an in-memory recording double live here.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use logcask_core::Epoch;
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};
use crate::file::LogFile;

/// Current archive format version.
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// Size of the metadata header file.
pub const ARCHIVE_METADATA_SIZE: u64 = 4 + 8 + 8;

// ---------------------------------------------------------------------
// Header file
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub format_version: u32,
    pub stable_uncompressed_size: u64,
    pub stable_size: u64,
}

impl ArchiveMetadata {
    pub fn to_bytes(&self) -> [u8; ARCHIVE_METADATA_SIZE as usize] {
        let mut bytes = [0u8; ARCHIVE_METADATA_SIZE as usize];
        bytes[0..4].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[4..12].copy_from_slice(&self.stable_uncompressed_size.to_le_bytes());
        bytes[12..20].copy_from_slice(&self.stable_size.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ARCHIVE_METADATA_SIZE as usize {
            return Err(ArchiveError::Corrupt("archive metadata header too short".into()));
        }
        Ok(ArchiveMetadata {
            format_version: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            stable_uncompressed_size: u64::from_le_bytes(bytes[4..12].try_into().unwrap()),
            stable_size: u64::from_le_bytes(bytes[12..20].try_into().unwrap()),
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|_| ArchiveError::NotFound(path.to_path_buf()))?;
        let mut bytes = [0u8; ARCHIVE_METADATA_SIZE as usize];
        file.read_exact(&mut bytes)
            .map_err(|_| ArchiveError::Corrupt("archive metadata header too short".into()))?;
        let metadata = Self::from_bytes(&bytes)?;
        if metadata.format_version != ARCHIVE_FORMAT_VERSION {
            return Err(ArchiveError::Corrupt(format!(
                "unsupported archive format version {}",
                metadata.format_version
            )));
        }
        Ok(metadata)
    }
}

/// Open handle on the header file, supporting in-place patching of the
/// stable sizes.
pub struct MetadataFileWriter {
    file: File,
    metadata: ArchiveMetadata,
}

impl MetadataFileWriter {
    /// Creates the header file with zeroed stable sizes.
    pub fn create(path: &Path) -> Result<Self> {
        let metadata = ArchiveMetadata {
            format_version: ARCHIVE_FORMAT_VERSION,
            stable_uncompressed_size: 0,
            stable_size: 0,
        };
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        file.write_all(&metadata.to_bytes())?;
        file.sync_all()?;
        Ok(MetadataFileWriter { file, metadata })
    }

    pub fn metadata(&self) -> ArchiveMetadata {
        self.metadata
    }

    /// Patches the stable-size fields in place and syncs.
    pub fn update_stable_sizes(&mut self, uncompressed_size: u64, size: u64) -> Result<()> {
        self.metadata.stable_uncompressed_size = uncompressed_size;
        self.metadata.stable_size = size;
        self.file.seek(SeekFrom::Start(4))?;
        self.file.write_all(&uncompressed_size.to_le_bytes())?;
        self.file.write_all(&size.to_le_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Per-file metadata rows
// ---------------------------------------------------------------------

/// One file's persisted metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_id: String,
    pub orig_file_id: String,
    pub path: String,
    pub group_id: u64,
    pub split_ix: u64,
    pub begin_ts: Epoch,
    pub end_ts: Epoch,
    pub num_messages: u64,
    pub num_uncompressed_bytes: u64,
    pub num_variables: u64,
    pub segment_id: u64,
    pub ts_pos_in_segment: u64,
    pub logtype_pos_in_segment: u64,
    pub var_pos_in_segment: u64,
    /// Newline-separated `message_ix:num_spaces_before_ts:format`
    /// records.
    pub encoded_timestamp_patterns: String,
}

impl FileMetadata {
    /// Builds the row for a file that has been placed in a segment.
    pub fn from_file(file: &LogFile) -> Self {
        let positions = file
            .positions()
            .expect("metadata row requested for a file outside any segment");
        FileMetadata {
            file_id: file.id().to_string(),
            orig_file_id: file.orig_file_id().to_string(),
            path: file.orig_path().to_string(),
            group_id: file.group_id(),
            split_ix: file.split_ix(),
            begin_ts: file.begin_ts(),
            end_ts: file.end_ts(),
            num_messages: file.num_messages(),
            num_uncompressed_bytes: file.num_uncompressed_bytes(),
            num_variables: file.num_variables(),
            segment_id: file.segment_id().expect("file has a segment"),
            ts_pos_in_segment: positions.ts_pos,
            logtype_pos_in_segment: positions.logtype_pos,
            var_pos_in_segment: positions.var_pos,
            encoded_timestamp_patterns: file.encoded_timestamp_patterns(),
        }
    }

    /// Whether the file carries timestamps at all.
    pub fn has_timestamps(&self) -> bool {
        self.encoded_timestamp_patterns
            .lines()
            .any(|line| line.splitn(3, ':').nth(2).is_some_and(|f| !f.is_empty()))
    }
}

// ---------------------------------------------------------------------
// Per-archive metadata DB
// ---------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct MetadataDoc {
    files: Vec<FileMetadata>,
    empty_directories: Vec<String>,
}

/// The archive-local metadata store (`metadata.db`).
pub struct MetadataDb {
    path: PathBuf,
    doc: MetadataDoc,
}

impl MetadataDb {
    pub fn create(path: &Path) -> Result<Self> {
        let db = MetadataDb {
            path: path.to_path_buf(),
            doc: MetadataDoc::default(),
        };
        db.persist()?;
        Ok(db)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read(path).map_err(|_| ArchiveError::NotFound(path.to_path_buf()))?;
        let doc: MetadataDoc = serde_json::from_slice(&raw)
            .map_err(|e| ArchiveError::Corrupt(format!("metadata.db unreadable: {}", e)))?;
        Ok(MetadataDb {
            path: path.to_path_buf(),
            doc,
        })
    }

    pub fn files(&self) -> &[FileMetadata] {
        &self.doc.files
    }

    pub fn empty_directories(&self) -> &[String] {
        &self.doc.empty_directories
    }

    /// Appends file rows and persists the document.
    pub fn add_files(&mut self, rows: &[FileMetadata]) -> Result<()> {
        self.doc.files.extend(rows.iter().cloned());
        self.persist()
            .map_err(|e| ArchiveError::DbBulkWriteFailed(e.to_string()))
    }

    pub fn add_empty_directories(&mut self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.doc
            .empty_directories
            .extend(paths.iter().cloned());
        self.persist()
            .map_err(|e| ArchiveError::DbBulkWriteFailed(e.to_string()))
    }

    /// Write-fsync-rename so a crash leaves either the old or the new
    /// document.
    fn persist(&self) -> Result<()> {
        let temp_path = self.path.with_extension("db.tmp");
        let raw = serde_json::to_vec(&self.doc)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&raw)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&temp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Global metadata DB
// ---------------------------------------------------------------------

/// Per-archive row in the global metadata DB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub uncompressed_size: u64,
    pub size: u64,
    pub begin_ts: Epoch,
    pub end_ts: Epoch,
}

/// Capability through which archives register themselves and their
/// files across the deployment. Writes from concurrent writers are
/// serialized by the implementation.
pub trait GlobalMetadataDb {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn add_archive(&mut self, archive_id: &str, stats: &ArchiveStats) -> Result<()>;
    fn update_archive_size(&mut self, archive_id: &str, stats: &ArchiveStats) -> Result<()>;
    fn add_files(&mut self, archive_id: &str, files: &[FileMetadata]) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GlobalDoc {
    archives: std::collections::BTreeMap<String, ArchiveStats>,
    files: Vec<(String, FileMetadata)>,
}

/// File-backed global metadata DB, addressed as `json://<path>`.
pub struct JsonGlobalMetadataDb {
    path: PathBuf,
    doc: GlobalDoc,
}

impl JsonGlobalMetadataDb {
    pub fn from_uri(uri: &str) -> Result<Self> {
        let path = uri
            .strip_prefix("json://")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ArchiveError::DbBadUri(uri.to_string()))?;
        Ok(Self::at_path(Path::new(path)))
    }

    pub fn at_path(path: &Path) -> Self {
        let doc = std::fs::read(path)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_default();
        JsonGlobalMetadataDb {
            path: path.to_path_buf(),
            doc,
        }
    }

    fn persist(&self) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        let raw = serde_json::to_vec(&self.doc)?;
        std::fs::write(&temp_path, raw)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl GlobalMetadataDb for JsonGlobalMetadataDb {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.persist()
    }

    fn add_archive(&mut self, archive_id: &str, stats: &ArchiveStats) -> Result<()> {
        self.doc.archives.insert(archive_id.to_string(), stats.clone());
        self.persist()
    }

    fn update_archive_size(&mut self, archive_id: &str, stats: &ArchiveStats) -> Result<()> {
        self.doc.archives.insert(archive_id.to_string(), stats.clone());
        self.persist()
    }

    fn add_files(&mut self, archive_id: &str, files: &[FileMetadata]) -> Result<()> {
        for row in files {
            self.doc.files.push((archive_id.to_string(), row.clone()));
        }
        self.persist()
            .map_err(|e| ArchiveError::DbBulkWriteFailed(e.to_string()))
    }
}

/// Recording double for tests and for embedders without a global DB.
#[derive(Debug, Default)]
pub struct InMemoryGlobalMetadataDb {
    pub archives: std::collections::BTreeMap<String, ArchiveStats>,
    pub files: Vec<(String, FileMetadata)>,
    pub open_count: usize,
}

impl GlobalMetadataDb for InMemoryGlobalMetadataDb {
    fn open(&mut self) -> Result<()> {
        self.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn add_archive(&mut self, archive_id: &str, stats: &ArchiveStats) -> Result<()> {
        self.archives.insert(archive_id.to_string(), stats.clone());
        Ok(())
    }

    fn update_archive_size(&mut self, archive_id: &str, stats: &ArchiveStats) -> Result<()> {
        self.archives.insert(archive_id.to_string(), stats.clone());
        Ok(())
    }

    fn add_files(&mut self, archive_id: &str, files: &[FileMetadata]) -> Result<()> {
        for row in files {
            self.files.push((archive_id.to_string(), row.clone()));
        }
        Ok(())
    }
}
