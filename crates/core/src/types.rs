//! Identifier and timestamp types shared across the archive.
//!
//! IDs are dense `u64`s assigned by their owning component (dictionaries
//! assign logtype and variable IDs, the writer assigns segment IDs). IDs
//! are never reused or reissued.

/// Identifier of a logtype dictionary entry.
pub type LogtypeId = u64;

/// Identifier of a variable dictionary entry.
pub type VariableId = u64;

/// Identifier of a sealed segment. Doubles as the segment's file name
/// inside the archive's `segments/` directory.
pub type SegmentId = u64;

/// Opaque tag attached to a file at ingestion to support later
/// co-location. Indexed, never interpreted.
pub type GroupId = u64;

/// Epoch timestamp in milliseconds.
pub type Epoch = i64;

/// Sentinel used for "no lower bound" in time-range queries and for a
/// file's `begin_ts` before any message is written.
pub const EPOCH_MIN: Epoch = i64::MIN;

/// Sentinel used for "no upper bound" in time-range queries and for a
/// file's `end_ts` before any message is written.
pub const EPOCH_MAX: Epoch = i64::MAX;
