//! Writer-side file state.
//!
//! A `LogFile` groups the messages of one original source file (or one
//! split of it). While open it owns three in-memory columns; appending
//! to a segment moves the columns out and records the file's positions
//! within the segment. The file's memory is fully released once its
//! segment seals and the metadata row is persisted.
//!
//! State transitions are monotonic: `Open` → `MovingToSegment` →
//! `InCommittedSegment`.

use std::collections::BTreeSet;

use logcask_core::{Epoch, GroupId, LogtypeId, SegmentId, TimestampPattern, VariableId, EPOCH_MAX, EPOCH_MIN};
use uuid::Uuid;

use crate::segment::{ColumnPositions, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationState {
    Open,
    MovingToSegment,
    InCommittedSegment,
}

pub struct LogFile {
    id: Uuid,
    orig_file_id: Uuid,
    orig_path: String,
    group_id: GroupId,
    split_ix: u64,

    begin_ts: Epoch,
    end_ts: Epoch,
    num_messages: u64,
    num_variables: u64,
    num_uncompressed_bytes: u64,

    timestamps: Vec<Epoch>,
    logtype_ids: Vec<LogtypeId>,
    variables: Vec<i64>,
    /// Distinct dictionary-variable IDs referenced by this file.
    variable_ids: BTreeSet<VariableId>,
    /// Distinct logtype IDs referenced by this file.
    logtype_id_set: BTreeSet<LogtypeId>,

    /// `(message_ix, pattern)` change records; `None` marks "no
    /// timestamp from here on".
    timestamp_patterns: Vec<(u64, Option<TimestampPattern>)>,

    segment_id: Option<SegmentId>,
    positions: Option<ColumnPositions>,
    state: SegmentationState,
    metadata_dirty: bool,
}

impl LogFile {
    pub fn new(orig_path: &str, group_id: GroupId, orig_file_id: Uuid, split_ix: u64) -> Self {
        LogFile {
            id: Uuid::new_v4(),
            orig_file_id,
            orig_path: orig_path.to_string(),
            group_id,
            split_ix,
            begin_ts: EPOCH_MAX,
            end_ts: EPOCH_MIN,
            num_messages: 0,
            num_variables: 0,
            num_uncompressed_bytes: 0,
            timestamps: Vec::new(),
            logtype_ids: Vec::new(),
            variables: Vec::new(),
            variable_ids: BTreeSet::new(),
            logtype_id_set: BTreeSet::new(),
            timestamp_patterns: Vec::new(),
            segment_id: None,
            positions: None,
            state: SegmentationState::Open,
            metadata_dirty: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn orig_file_id(&self) -> Uuid {
        self.orig_file_id
    }

    pub fn orig_path(&self) -> &str {
        &self.orig_path
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn split_ix(&self) -> u64 {
        self.split_ix
    }

    pub fn begin_ts(&self) -> Epoch {
        self.begin_ts
    }

    pub fn end_ts(&self) -> Epoch {
        self.end_ts
    }

    pub fn num_messages(&self) -> u64 {
        self.num_messages
    }

    pub fn num_variables(&self) -> u64 {
        self.num_variables
    }

    pub fn num_uncompressed_bytes(&self) -> u64 {
        self.num_uncompressed_bytes
    }

    pub fn segment_id(&self) -> Option<SegmentId> {
        self.segment_id
    }

    pub fn positions(&self) -> Option<ColumnPositions> {
        self.positions
    }

    pub fn state(&self) -> SegmentationState {
        self.state
    }

    pub fn variable_ids(&self) -> &BTreeSet<VariableId> {
        &self.variable_ids
    }

    pub fn logtype_id_set(&self) -> &BTreeSet<LogtypeId> {
        &self.logtype_id_set
    }

    pub fn timestamp_patterns(&self) -> &[(u64, Option<TimestampPattern>)] {
        &self.timestamp_patterns
    }

    /// Whether any non-empty timestamp pattern has been recorded; decides
    /// which segment stream the file joins.
    pub fn has_ts_pattern(&self) -> bool {
        self.timestamp_patterns.iter().any(|(_, p)| p.is_some())
    }

    /// The pattern in effect for the next message, if any.
    pub fn current_ts_pattern(&self) -> Option<&TimestampPattern> {
        self.timestamp_patterns
            .last()
            .and_then(|(_, p)| p.as_ref())
    }

    /// Records a pattern change effective from the next message.
    pub fn change_ts_pattern(&mut self, pattern: Option<&TimestampPattern>) {
        self.timestamp_patterns
            .push((self.num_messages, pattern.cloned()));
        self.metadata_dirty = true;
    }

    /// Appends one encoded message to the file's columns.
    pub fn write_encoded_msg(
        &mut self,
        timestamp: Epoch,
        logtype_id: LogtypeId,
        encoded_vars: &[i64],
        dict_var_ids: &[VariableId],
        num_uncompressed_bytes: u64,
    ) {
        assert_eq!(
            self.state,
            SegmentationState::Open,
            "message written to a file already moved into a segment"
        );

        self.timestamps.push(timestamp);
        self.logtype_ids.push(logtype_id);
        self.variables.extend_from_slice(encoded_vars);
        self.logtype_id_set.insert(logtype_id);
        self.variable_ids.extend(dict_var_ids.iter().copied());

        self.num_messages += 1;
        self.num_variables += encoded_vars.len() as u64;
        self.num_uncompressed_bytes += num_uncompressed_bytes;

        if timestamp < self.begin_ts {
            self.begin_ts = timestamp;
        }
        if timestamp > self.end_ts {
            self.end_ts = timestamp;
        }
        self.metadata_dirty = true;
    }

    /// Moves the file's columns into `segment` and records the slice
    /// positions. The file's in-memory columns are released.
    pub fn append_to_segment(&mut self, segment: &mut Segment) {
        assert_eq!(
            self.state,
            SegmentationState::Open,
            "file appended to a segment twice"
        );

        let positions =
            segment.append_file_columns(&self.timestamps, &self.logtype_ids, &self.variables);
        self.segment_id = Some(segment.id());
        self.positions = Some(positions);
        self.state = SegmentationState::MovingToSegment;
        self.metadata_dirty = true;

        self.timestamps = Vec::new();
        self.logtype_ids = Vec::new();
        self.variables = Vec::new();
    }

    pub fn mark_as_in_committed_segment(&mut self) {
        debug_assert_eq!(self.state, SegmentationState::MovingToSegment);
        self.state = SegmentationState::InCommittedSegment;
    }

    pub fn is_metadata_dirty(&self) -> bool {
        self.metadata_dirty
    }

    pub fn mark_metadata_as_clean(&mut self) {
        self.metadata_dirty = false;
    }

    /// Newline-separated `message_ix:num_spaces_before_ts:format`
    /// records, as persisted in the metadata row. An empty format marks
    /// a "no timestamp" span.
    pub fn encoded_timestamp_patterns(&self) -> String {
        let mut out = String::new();
        for (msg_ix, pattern) in &self.timestamp_patterns {
            match pattern {
                Some(p) => {
                    out.push_str(&format!(
                        "{}:{}:{}\n",
                        msg_ix,
                        p.num_spaces_before_ts(),
                        p.format()
                    ));
                }
                None => out.push_str(&format!("{}:0:\n", msg_ix)),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> LogFile {
        LogFile::new("/var/log/app.log", 0, Uuid::new_v4(), 0)
    }

    #[test]
    fn new_file_has_inverted_ts_bounds() {
        let file = sample_file();
        assert_eq!(file.begin_ts(), EPOCH_MAX);
        assert_eq!(file.end_ts(), EPOCH_MIN);
        assert_eq!(file.num_messages(), 0);
        assert_eq!(file.state(), SegmentationState::Open);
        assert!(!file.has_ts_pattern());
    }

    #[test]
    fn write_msg_updates_bounds_and_counts() {
        let mut file = sample_file();
        file.write_encoded_msg(2000, 0, &[1, 2], &[0], 40);
        file.write_encoded_msg(1000, 1, &[], &[], 20);
        file.write_encoded_msg(3000, 0, &[3], &[], 30);

        assert_eq!(file.begin_ts(), 1000);
        assert_eq!(file.end_ts(), 3000);
        assert_eq!(file.num_messages(), 3);
        assert_eq!(file.num_variables(), 3);
        assert_eq!(file.num_uncompressed_bytes(), 90);
        assert_eq!(file.logtype_id_set().len(), 2);
        assert_eq!(file.variable_ids().len(), 1);
        assert!(file.is_metadata_dirty());
    }

    #[test]
    fn pattern_changes_record_message_index() {
        let mut file = sample_file();
        let pattern = TimestampPattern::new(0, "%Y-%m-%d %H:%M:%S");

        file.change_ts_pattern(Some(&pattern));
        file.write_encoded_msg(1, 0, &[], &[], 10);
        file.write_encoded_msg(2, 0, &[], &[], 10);
        file.change_ts_pattern(None);
        file.write_encoded_msg(0, 0, &[], &[], 10);

        assert!(file.has_ts_pattern());
        assert_eq!(file.timestamp_patterns().len(), 2);
        assert_eq!(file.timestamp_patterns()[0].0, 0);
        assert_eq!(file.timestamp_patterns()[1].0, 2);
        assert!(file.timestamp_patterns()[1].1.is_none());

        let encoded = file.encoded_timestamp_patterns();
        assert_eq!(encoded, "0:0:%Y-%m-%d %H:%M:%S\n2:0:\n");
    }

    #[test]
    fn append_to_segment_moves_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 0, 3);

        let mut file = sample_file();
        file.write_encoded_msg(1000, 0, &[11, 22], &[], 10);
        file.write_encoded_msg(2000, 1, &[33], &[], 10);

        file.append_to_segment(&mut segment);
        assert_eq!(file.state(), SegmentationState::MovingToSegment);
        assert_eq!(file.segment_id(), Some(0));
        let positions = file.positions().unwrap();
        assert_eq!(positions.ts_pos, 0);
        assert_eq!(positions.var_pos, 0);
        assert_eq!(segment.uncompressed_size(), (2 + 2 + 3) * 8);

        file.mark_as_in_committed_segment();
        assert_eq!(file.state(), SegmentationState::InCommittedSegment);
    }

    #[test]
    #[should_panic(expected = "already moved")]
    fn write_after_append_panics() {
        let dir = tempfile::tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 0, 3);
        let mut file = sample_file();
        file.write_encoded_msg(1, 0, &[], &[], 1);
        file.append_to_segment(&mut segment);
        file.write_encoded_msg(2, 0, &[], &[], 1);
    }
}
