//! Fixed names inside an archive directory.
//!
//! ```text
//! <archive_root>/<archive_id>/
//!     metadata            20-byte header: format_version, stable sizes
//!     logtype.dict        logtype dictionary (count header + zstd entries)
//!     logtype.segindex    segment-index sidecar (zstd records)
//!     var.dict
//!     var.segindex
//!     metadata.db         per-archive metadata document
//!     logs/               open-file scratch
//!     segments/<id>       sealed column streams, named by segment ID
//! ```

pub const METADATA_FILE: &str = "metadata";
pub const LOGTYPE_DICT_FILE: &str = "logtype.dict";
pub const LOGTYPE_SEGINDEX_FILE: &str = "logtype.segindex";
pub const VAR_DICT_FILE: &str = "var.dict";
pub const VAR_SEGINDEX_FILE: &str = "var.segindex";
pub const METADATA_DB_FILE: &str = "metadata.db";
pub const LOGS_DIR: &str = "logs";
pub const SEGMENTS_DIR: &str = "segments";
