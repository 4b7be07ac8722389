//! Search execution: the decompress-and-wildcard-verify loop.
//!
//! For each file whose segment survives pruning and whose time range
//! intersects the query's, messages are walked in order: subquery
//! matching on `(logtype_id, encoded_vars)` first, then — when a
//! subquery demands it or the query is a bare non-trivial string — full
//! decompression and `wildcard_match_unsafe` verification. Matches go to
//! the output sink; a sink failure aborts the search, a file that fails
//! to open is skipped.

use logcask_archive::{ArchiveReader, FileMetadata, Message, OpenFile};
use logcask_core::wildcard::wildcard_match_unsafe;
use logcask_core::Epoch;
use thiserror::Error;
use tracing::warn;

use crate::query::{Query, SubQuery};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Archive(#[from] logcask_archive::ArchiveError),

    #[error("output sink failed: {0}")]
    SinkFailed(String),
}

/// Failure signal from an output sink.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Where matching messages go. The search stops when a sink call fails.
pub trait OutputSink {
    fn add_result(
        &mut self,
        orig_path: &str,
        message: &str,
        timestamp: Epoch,
    ) -> Result<(), SinkError>;
}

/// Writes `message` lines to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn add_result(&mut self, _orig_path: &str, message: &str, _timestamp: Epoch) -> Result<(), SinkError> {
        use std::io::Write;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", message).map_err(|e| SinkError(e.to_string()))
    }
}

/// Collects results in memory; the test double.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub results: Vec<(String, String, Epoch)>,
    /// When set, fail after this many results.
    pub fail_after: Option<usize>,
}

impl OutputSink for RecordingSink {
    fn add_result(&mut self, orig_path: &str, message: &str, timestamp: Epoch) -> Result<(), SinkError> {
        if let Some(limit) = self.fail_after {
            if self.results.len() >= limit {
                return Err(SinkError("sink full".into()));
            }
        }
        self.results
            .push((orig_path.to_string(), message.to_string(), timestamp));
        Ok(())
    }
}

/// Searches a whole archive, honoring `limit`. Returns the number of
/// messages emitted.
pub fn search_archive(
    reader: &mut ArchiveReader,
    query: &Query,
    limit: usize,
    sink: &mut dyn OutputSink,
) -> Result<usize, SearchError> {
    let mut num_matches = 0usize;
    let files: Vec<FileMetadata> = reader.files().to_vec();

    for meta in &files {
        if num_matches >= limit {
            break;
        }

        // Time-range pruning on file bounds
        if meta.has_timestamps()
            && (meta.begin_ts > query.search_end_ts() || meta.end_ts < query.search_begin_ts())
        {
            continue;
        }
        if !meta.has_timestamps() && query.has_time_range() {
            continue;
        }

        // Segment pruning
        let relevant: Vec<&SubQuery> = if query.contains_sub_queries() {
            let relevant = query.relevant_sub_queries(meta.segment_id);
            if relevant.is_empty() {
                continue;
            }
            relevant
        } else {
            Vec::new()
        };

        let mut file = match reader.open_file(meta) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %meta.path, error = %e, "skipping file that failed to open");
                continue;
            }
        };

        num_matches += search_file(
            reader,
            query,
            &relevant,
            meta,
            &mut file,
            limit - num_matches,
            sink,
        )?;
    }

    Ok(num_matches)
}

/// Searches one open file.
fn search_file(
    reader: &mut ArchiveReader,
    query: &Query,
    relevant: &[&SubQuery],
    meta: &FileMetadata,
    file: &mut OpenFile,
    limit: usize,
    sink: &mut dyn OutputSink,
) -> Result<usize, SearchError> {
    let mut num_matches = 0usize;
    let check_ts = meta.has_timestamps();

    while num_matches < limit {
        let Some((message, matching_sub_query)) =
            find_matching_message(reader, query, relevant, check_ts, file)?
        else {
            break;
        };

        let decompressed = reader.decompress_message(&message)?;

        // Verify when the subquery demands it, or when a match-all-less
        // query has no subqueries to vouch for the message
        let requires_verification = match matching_sub_query {
            Some(sub_query) => sub_query.wildcard_match_required(),
            None => !query.search_string_matches_all(),
        };
        if requires_verification
            && !wildcard_match_unsafe(
                &decompressed,
                query.search_string(),
                !query.ignore_case(),
            )
        {
            continue;
        }

        sink.add_result(&meta.path, &decompressed, message.timestamp)
            .map_err(|e| SearchError::SinkFailed(e.to_string()))?;
        num_matches += 1;
    }

    Ok(num_matches)
}

/// Advances to the next message passing the timestamp filter and (when
/// subqueries exist) satisfying one of them.
fn find_matching_message<'q>(
    reader: &mut ArchiveReader,
    query: &Query,
    relevant: &[&'q SubQuery],
    check_ts: bool,
    file: &mut OpenFile,
) -> Result<Option<(Message, Option<&'q SubQuery>)>, SearchError> {
    while let Some(message) = reader.next_message(file)? {
        if check_ts && !query.timestamp_is_in_search_time_range(message.timestamp) {
            continue;
        }
        if relevant.is_empty() {
            return Ok(Some((message, None)));
        }
        if let Some(sub_query) = relevant.iter().find(|sq| {
            sq.matches_logtype(message.logtype_id) && sq.matches_vars(&message.encoded_vars)
        }) {
            return Ok(Some((message, Some(*sub_query))));
        }
    }
    Ok(None)
}
