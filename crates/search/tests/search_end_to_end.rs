//! End-to-end search scenarios: planning, pruning and verification
//! against real archives on disk.

use logcask_archive::{ArchiveReader, ArchiveWriter, InMemoryGlobalMetadataDb, WriterConfig};
use logcask_core::{TimestampPattern, TimestampPatternSet, EPOCH_MAX, EPOCH_MIN};
use logcask_search::{process_raw_query, search_archive, RecordingSink};
use uuid::Uuid;

fn open_writer(dir: &std::path::Path) -> ArchiveWriter {
    ArchiveWriter::open(
        WriterConfig {
            output_dir: dir.to_path_buf(),
            ..WriterConfig::default()
        },
        TimestampPatternSet::known_patterns(),
        Box::new(InMemoryGlobalMetadataDb::default()),
    )
    .unwrap()
}

/// Builds the three-message reference archive.
fn build_reference_archive(dir: &std::path::Path) -> std::path::PathBuf {
    let mut writer = open_writer(dir);
    let path = writer.path().to_path_buf();

    writer.create_and_open_file("/var/log/net.log", 0, Uuid::new_v4(), 0);
    let pattern = TimestampPattern::new(0, "%Y-%m-%d %H:%M:%S,%3");
    writer.change_ts_pattern(Some(&pattern));
    writer
        .write_msg(1000, "connected to host 10.1.2.3 port 443", 40)
        .unwrap();
    writer
        .write_msg(2000, "transferred 1048576 bytes in 1.23 seconds", 45)
        .unwrap();
    writer.write_msg(3000, "disconnected", 15).unwrap();
    writer.append_file_to_segment().unwrap();
    writer.close().unwrap();
    path
}

fn run_search(
    reader: &mut ArchiveReader,
    search_string: &str,
    ignore_case: bool,
) -> Vec<(String, i64)> {
    let query = match process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        search_string,
        EPOCH_MIN,
        EPOCH_MAX,
        ignore_case,
    ) {
        Some(query) => query,
        None => return Vec::new(),
    };
    let mut sink = RecordingSink::default();
    search_archive(reader, &query, usize::MAX, &mut sink).unwrap();
    sink.results
        .into_iter()
        .map(|(_, message, ts)| (message, ts))
        .collect()
}

#[test]
fn integer_search_finds_exactly_its_message() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let mut reader = ArchiveReader::open(&archive).unwrap();

    let results = run_search(&mut reader, "1048576", false);
    assert_eq!(
        results,
        vec![("transferred 1048576 bytes in 1.23 seconds".to_string(), 2000)]
    );
}

#[test]
fn dictionary_search_finds_exactly_its_message() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let mut reader = ArchiveReader::open(&archive).unwrap();

    let results = run_search(&mut reader, "10.1.2.3", false);
    assert_eq!(
        results,
        vec![("connected to host 10.1.2.3 port 443".to_string(), 1000)]
    );
}

#[test]
fn match_all_returns_everything_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let mut reader = ArchiveReader::open(&archive).unwrap();

    let results = run_search(&mut reader, "*", false);
    assert_eq!(
        results,
        vec![
            ("connected to host 10.1.2.3 port 443".to_string(), 1000),
            ("transferred 1048576 bytes in 1.23 seconds".to_string(), 2000),
            ("disconnected".to_string(), 3000),
        ]
    );
}

#[test]
fn absent_value_matches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let mut reader = ArchiveReader::open(&archive).unwrap();

    assert!(run_search(&mut reader, "7777777", false).is_empty());
    assert!(run_search(&mut reader, "10.9.9.9", false).is_empty());
}

#[test]
fn case_insensitive_search() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let mut reader = ArchiveReader::open(&archive).unwrap();

    assert!(run_search(&mut reader, "DISCONNECTED", true).len() == 1);
    assert!(run_search(&mut reader, "DISCONNECTED", false).is_empty());
}

#[test]
fn var_subqueries_always_require_verification() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let reader = ArchiveReader::open(&archive).unwrap();

    let query = process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        "10.1.2.3",
        EPOCH_MIN,
        EPOCH_MAX,
        false,
    )
    .unwrap();
    assert!(query.contains_sub_queries());
    assert!(query
        .sub_queries()
        .iter()
        .all(|sq| sq.wildcard_match_required()));
}

#[test]
fn time_range_filters_messages() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let mut reader = ArchiveReader::open(&archive).unwrap();

    let query = process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        "*",
        1500,
        2500,
        false,
    )
    .unwrap();
    let mut sink = RecordingSink::default();
    search_archive(&mut reader, &query, usize::MAX, &mut sink).unwrap();
    assert_eq!(sink.results.len(), 1);
    assert_eq!(sink.results[0].2, 2000);
}

#[test]
fn limit_stops_early() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let mut reader = ArchiveReader::open(&archive).unwrap();

    let query = process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        "*",
        EPOCH_MIN,
        EPOCH_MAX,
        false,
    )
    .unwrap();
    let mut sink = RecordingSink::default();
    let n = search_archive(&mut reader, &query, 2, &mut sink).unwrap();
    assert_eq!(n, 2);
    assert_eq!(sink.results.len(), 2);
}

#[test]
fn failing_sink_aborts_search() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let mut reader = ArchiveReader::open(&archive).unwrap();

    let query = process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        "*",
        EPOCH_MIN,
        EPOCH_MAX,
        false,
    )
    .unwrap();
    let mut sink = RecordingSink {
        fail_after: Some(1),
        ..RecordingSink::default()
    };
    let result = search_archive(&mut reader, &query, usize::MAX, &mut sink);
    assert!(matches!(
        result,
        Err(logcask_search::SearchError::SinkFailed(_))
    ));
    // The result already delivered stays delivered
    assert_eq!(sink.results.len(), 1);
}

#[test]
fn segment_pruning_opens_only_the_needed_segment() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = open_writer(dir.path());
    let archive = writer.path().to_path_buf();

    // Ten thousand messages with dictionary variable "alice7" sealed
    // into the first segment, ten thousand with "bob42" into the second
    writer.create_and_open_file("/log/alice.log", 0, Uuid::new_v4(), 0);
    for _ in 0..10_000 {
        writer.write_msg(0, "ping host=alice7", 20).unwrap();
    }
    writer.append_file_to_segment().unwrap();
    writer.close_segment_and_persist_file_metadata(false).unwrap();

    writer.create_and_open_file("/log/bob.log", 0, Uuid::new_v4(), 0);
    for _ in 0..10_000 {
        writer.write_msg(0, "ping host=bob42", 19).unwrap();
    }
    writer.append_file_to_segment().unwrap();
    writer.close().unwrap();

    let mut reader = ArchiveReader::open(&archive).unwrap();
    // Both files share the logtype; the dictionary variables split them
    assert_eq!(reader.logtype_dict().len(), 1);
    assert_eq!(reader.var_dict().len(), 2);

    let query = process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        "alice7",
        EPOCH_MIN,
        EPOCH_MAX,
        false,
    )
    .unwrap();

    // Pruning narrowed the query to the first segment
    let alice_segment = reader
        .files()
        .iter()
        .find(|f| f.path == "/log/alice.log")
        .unwrap()
        .segment_id;
    assert_eq!(
        query.ids_of_matching_segments(),
        std::collections::BTreeSet::from([alice_segment])
    );

    let mut sink = RecordingSink::default();
    let n = search_archive(&mut reader, &query, usize::MAX, &mut sink).unwrap();
    assert_eq!(n, 10_000);
    assert!(sink.results.iter().all(|(path, _, _)| path == "/log/alice.log"));

    // Exactly one segment was ever opened
    assert_eq!(reader.segment_open_count(), 1);
}

#[test]
fn wildcard_in_middle_forces_verification() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = open_writer(dir.path());
    let archive = writer.path().to_path_buf();

    writer.create_and_open_file("/log/conn.log", 0, Uuid::new_v4(), 0);
    writer
        .write_msg(0, "connected but later failed", 30)
        .unwrap();
    writer.write_msg(0, "connect-rejected", 20).unwrap();
    writer.append_file_to_segment().unwrap();
    writer.close().unwrap();

    let mut reader = ArchiveReader::open(&archive).unwrap();

    // Both messages are pure static text, so logtype pruning admits
    // both; only the wildcard verification separates them
    let results = run_search(&mut reader, "connect*failed", false);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "connected but later failed");
}

#[test]
fn middle_wildcard_on_var_token_keeps_requirement_on_subquery() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = open_writer(dir.path());
    let archive = writer.path().to_path_buf();

    writer.create_and_open_file("/log/id.log", 0, Uuid::new_v4(), 0);
    writer.write_msg(0, "request id=abc123xyz served", 30).unwrap();
    writer.write_msg(0, "request id=abc999xyz served", 30).unwrap();
    writer.write_msg(0, "request denied", 20).unwrap();
    writer.append_file_to_segment().unwrap();
    writer.close().unwrap();

    let mut reader = ArchiveReader::open(&archive).unwrap();
    let query = process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        "abc123*xyz",
        EPOCH_MIN,
        EPOCH_MAX,
        false,
    )
    .unwrap();
    assert!(query
        .sub_queries()
        .iter()
        .any(|sq| sq.wildcard_match_required()));

    let mut sink = RecordingSink::default();
    search_archive(&mut reader, &query, usize::MAX, &mut sink).unwrap();
    assert_eq!(sink.results.len(), 1);
    assert_eq!(sink.results[0].1, "request id=abc123xyz served");
}

#[test]
fn double_star_and_single_star_plan_identically() {
    let dir = tempfile::tempdir().unwrap();
    let archive = build_reference_archive(dir.path());
    let reader = ArchiveReader::open(&archive).unwrap();

    let a = process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        "*1048576*",
        EPOCH_MIN,
        EPOCH_MAX,
        false,
    )
    .unwrap();
    let b = process_raw_query(
        reader.logtype_dict(),
        reader.var_dict(),
        "**1048576**",
        EPOCH_MIN,
        EPOCH_MAX,
        false,
    )
    .unwrap();
    assert_eq!(a.search_string(), b.search_string());
    assert_eq!(a.sub_queries().len(), b.sub_queries().len());
}
