//! End-to-end archive write/read scenarios.

use logcask_archive::{
    ingest_ir_stream, ArchiveMetadata, ArchiveReader, ArchiveWriter, InMemoryGlobalMetadataDb,
    JsonGlobalMetadataDb, WriterConfig,
};
use logcask_core::TimestampPatternSet;
use logcask_ir::IrSerializer;
use uuid::Uuid;

fn test_config(dir: &std::path::Path) -> WriterConfig {
    WriterConfig {
        output_dir: dir.to_path_buf(),
        ..WriterConfig::default()
    }
}

fn open_writer(dir: &std::path::Path) -> ArchiveWriter {
    ArchiveWriter::open(
        test_config(dir),
        TimestampPatternSet::known_patterns(),
        Box::new(InMemoryGlobalMetadataDb::default()),
    )
    .unwrap()
}

#[test]
fn single_file_three_messages() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = open_writer(dir.path());
    let archive_path = writer.path().to_path_buf();

    writer.create_and_open_file("/var/log/net.log", 0, Uuid::new_v4(), 0);
    let pattern = logcask_core::TimestampPattern::new(0, "%Y-%m-%d %H:%M:%S,%3");
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

    let mut reader = ArchiveReader::open(&archive_path).unwrap();

    // Three distinct logtypes; the IP is the only dictionary variable
    assert_eq!(reader.logtype_dict().len(), 3);
    assert_eq!(reader.var_dict().len(), 1);
    assert_eq!(
        reader.var_dict().get_by_value(b"10.1.2.3").unwrap().id,
        0
    );

    let files = reader.files().to_vec();
    assert_eq!(files.len(), 1);
    let meta = &files[0];
    assert_eq!(meta.num_messages, 3);
    assert_eq!(meta.begin_ts, 1000);
    assert_eq!(meta.end_ts, 3000);
    assert_eq!(meta.num_uncompressed_bytes, 100);
    // 2 vars in message 1, 2 in message 2, 0 in message 3
    assert_eq!(meta.num_variables, 4);

    // Messages come back byte-identical, in order
    let mut file = reader.open_file(meta).unwrap();
    let mut texts = Vec::new();
    while let Some(message) = reader.next_message(&mut file).unwrap() {
        texts.push((
            message.timestamp,
            reader.decompress_message(&message).unwrap(),
        ));
    }
    assert_eq!(
        texts,
        vec![
            (1000, "connected to host 10.1.2.3 port 443".to_string()),
            (2000, "transferred 1048576 bytes in 1.23 seconds".to_string()),
            (3000, "disconnected".to_string()),
        ]
    );
}

#[test]
fn ingest_lines_strips_and_restores_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = open_writer(dir.path());
    let archive_path = writer.path().to_path_buf();

    let lines = [
        "2016-05-08 07:34:05,251 container started on node-07",
        "2016-05-08 07:34:06,000 heap usage 12.5 percent",
        "2016-05-08 07:34:06,500 shutting down",
    ];

    writer.create_and_open_file("/var/log/yarn.log", 0, Uuid::new_v4(), 0);
    for line in lines {
        writer.ingest_line(line).unwrap();
    }
    writer.append_file_to_segment().unwrap();
    writer.close().unwrap();

    let mut reader = ArchiveReader::open(&archive_path).unwrap();
    let meta = reader.files()[0].clone();
    let mut extracted = Vec::new();
    reader
        .extract_file(&meta, |line| extracted.push(line.to_string()))
        .unwrap();
    assert_eq!(extracted, lines);
}

#[test]
fn untimestamped_file_lands_in_its_own_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = open_writer(dir.path());
    let archive_path = writer.path().to_path_buf();

    // File with timestamps
    writer.create_and_open_file("/log/a.log", 0, Uuid::new_v4(), 0);
    writer
        .ingest_line("2020-01-01 00:00:00 job 1 started")
        .unwrap();
    writer.append_file_to_segment().unwrap();

    // File without timestamps
    writer.create_and_open_file("/log/b.log", 0, Uuid::new_v4(), 0);
    writer.ingest_line("plain line one").unwrap();
    writer.ingest_line("plain line two").unwrap();
    writer.append_file_to_segment().unwrap();

    writer.close().unwrap();

    let reader = ArchiveReader::open(&archive_path).unwrap();
    let files = reader.files();
    assert_eq!(files.len(), 2);

    let a = files.iter().find(|f| f.path == "/log/a.log").unwrap();
    let b = files.iter().find(|f| f.path == "/log/b.log").unwrap();
    assert!(a.has_timestamps());
    assert!(!b.has_timestamps());
    // Two segment streams, two distinct segments
    assert_ne!(a.segment_id, b.segment_id);
}

#[test]
fn crash_consistency_via_stable_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = open_writer(dir.path());
    let archive_path = writer.path().to_path_buf();

    // First file, sealed explicitly
    writer.create_and_open_file("/log/sealed.log", 0, Uuid::new_v4(), 0);
    writer
        .ingest_line("2020-01-01 00:00:01 worker 1 ready")
        .unwrap();
    writer
        .ingest_line("2020-01-01 00:00:02 worker 2 ready")
        .unwrap();
    writer.append_file_to_segment().unwrap();
    writer.close_segment_and_persist_file_metadata(true).unwrap();

    let sealed_uncompressed: u64 = 35 + 35; // two lines + newlines

    // Simulated crash: reopen and list
    {
        let reader = ArchiveReader::open(&archive_path).unwrap();
        assert_eq!(reader.files().len(), 1);
        assert_eq!(reader.files()[0].path, "/log/sealed.log");
        assert_eq!(
            reader.metadata().stable_uncompressed_size,
            sealed_uncompressed
        );
    }

    // Second file appended but its segment never sealed
    writer.create_and_open_file("/log/lost.log", 0, Uuid::new_v4(), 0);
    writer
        .ingest_line("2020-01-01 00:00:03 worker 3 ready")
        .unwrap();
    writer.append_file_to_segment().unwrap();

    // Crash: drop the writer without close()
    drop(writer);

    let reader = ArchiveReader::open(&archive_path).unwrap();
    assert_eq!(reader.files().len(), 1, "unsealed file must stay invisible");
    assert_eq!(reader.files()[0].path, "/log/sealed.log");
    assert_eq!(
        reader.metadata().stable_uncompressed_size,
        sealed_uncompressed
    );
}

#[test]
fn segment_seals_when_size_target_reached() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.target_segment_uncompressed_size = 128; // tiny target
    let mut writer = ArchiveWriter::open(
        config,
        TimestampPatternSet::known_patterns(),
        Box::new(InMemoryGlobalMetadataDb::default()),
    )
    .unwrap();
    let archive_path = writer.path().to_path_buf();

    for i in 0..20 {
        writer.create_and_open_file(&format!("/log/file-{i}.log"), 0, Uuid::new_v4(), 0);
        writer
            .ingest_line(&format!("2020-01-01 00:00:{:02} event number {} fired", i % 60, i))
            .unwrap();
        writer.append_file_to_segment().unwrap();
    }
    writer.close().unwrap();

    let reader = ArchiveReader::open(&archive_path).unwrap();
    assert_eq!(reader.files().len(), 20);
    let distinct_segments: std::collections::BTreeSet<u64> =
        reader.files().iter().map(|f| f.segment_id).collect();
    assert!(
        distinct_segments.len() > 1,
        "tiny target must produce multiple segments, got {:?}",
        distinct_segments
    );
}

#[test]
fn archive_open_fails_when_directory_exists() {
    let dir = tempfile::tempdir().unwrap();
    let id = Uuid::new_v4();
    let mut config = test_config(dir.path());
    config.archive_id = Some(id);

    let writer = ArchiveWriter::open(
        config.clone(),
        TimestampPatternSet::known_patterns(),
        Box::new(InMemoryGlobalMetadataDb::default()),
    )
    .unwrap();
    writer.close().unwrap();

    let result = ArchiveWriter::open(
        config,
        TimestampPatternSet::known_patterns(),
        Box::new(InMemoryGlobalMetadataDb::default()),
    );
    assert!(matches!(
        result,
        Err(logcask_archive::ArchiveError::FileExists(_))
    ));
}

#[test]
fn global_metadata_db_records_archive_and_files() {
    let dir = tempfile::tempdir().unwrap();
    let global_path = dir.path().join("global.json");
    let uri = format!("json://{}", global_path.display());

    let mut writer = ArchiveWriter::open(
        test_config(dir.path()),
        TimestampPatternSet::known_patterns(),
        Box::new(JsonGlobalMetadataDb::from_uri(&uri).unwrap()),
    )
    .unwrap();
    let archive_id = writer.id().to_string();

    writer.create_and_open_file("/log/app.log", 7, Uuid::new_v4(), 0);
    writer
        .ingest_line("2021-06-01 10:00:00 request 9 handled")
        .unwrap();
    writer.append_file_to_segment().unwrap();
    writer.close().unwrap();

    let raw = std::fs::read_to_string(&global_path).unwrap();
    assert!(raw.contains(&archive_id));
    assert!(raw.contains("/log/app.log"));
}

#[test]
fn ir_stream_ingestion_matches_direct_ingestion() {
    let dir = tempfile::tempdir().unwrap();

    let mut ser = IrSerializer::eight_byte("%Y-%m-%d %H:%M:%S,%3", "", "UTC").unwrap();
    ser.add_message(1000, "pipeline stage 3 took 9.75 s").unwrap();
    ser.add_message(2000, "pipeline idle").unwrap();
    let stream = ser.finish();

    let mut writer = open_writer(dir.path());
    let archive_path = writer.path().to_path_buf();
    let count = ingest_ir_stream(&mut writer, &stream, "remote://pipeline.log", 0).unwrap();
    assert_eq!(count, 2);
    writer.close().unwrap();

    let mut reader = ArchiveReader::open(&archive_path).unwrap();
    let meta = reader.files()[0].clone();
    assert_eq!(meta.num_messages, 2);

    let mut file = reader.open_file(&meta).unwrap();
    let m1 = reader.next_message(&mut file).unwrap().unwrap();
    assert_eq!(
        reader.decompress_message(&m1).unwrap(),
        "pipeline stage 3 took 9.75 s"
    );
    assert_eq!(m1.timestamp, 1000);
    let m2 = reader.next_message(&mut file).unwrap().unwrap();
    assert_eq!(reader.decompress_message(&m2).unwrap(), "pipeline idle");
}

#[test]
fn metadata_header_is_twenty_bytes_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let writer = open_writer(dir.path());
    let archive_path = writer.path().to_path_buf();
    writer.close().unwrap();

    let header_path = archive_path.join("metadata");
    assert_eq!(std::fs::metadata(&header_path).unwrap().len(), 20);
    let metadata = ArchiveMetadata::read(&header_path).unwrap();
    assert_eq!(metadata.format_version, 1);
    assert_eq!(metadata.stable_uncompressed_size, 0);
    assert!(metadata.stable_size >= 20);
}
