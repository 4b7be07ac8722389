//! `logcask` command-line front end: compress, extract, search.
//!
//! This is a thin shell over the library crates; all archive semantics
//! live there. Exit code is zero on success and nonzero when any
//! archive could not be processed or the output sink failed.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use uuid::Uuid;

use logcask_archive::{
    ArchiveReader, ArchiveWriter, InMemoryGlobalMetadataDb, JsonGlobalMetadataDb, WriterConfig,
};
use logcask_core::{TimestampPatternSet, EPOCH_MAX, EPOCH_MIN};
use logcask_search::{process_raw_query, search_archive, StdoutSink};

#[derive(Parser)]
#[command(name = "logcask", about = "Compressed log archive", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress log files into a new archive
    Compress {
        /// Directory to create the archive under
        output_dir: PathBuf,
        /// Log files to ingest
        inputs: Vec<PathBuf>,
        /// Seal a segment when its uncompressed size reaches this many
        /// bytes
        #[arg(long, default_value_t = 256 * 1024 * 1024)]
        target_segment_size: u64,
        /// zstd compression level
        #[arg(long, default_value_t = 3)]
        compression_level: i32,
        /// Group tag recorded on every ingested file
        #[arg(long, default_value_t = 0)]
        group_id: u64,
        /// Global metadata DB location (json://<path>)
        #[arg(long)]
        global_db: Option<String>,
    },
    /// Decompress an archive back into log lines on stdout
    Extract {
        /// Path to the archive directory
        archive: PathBuf,
    },
    /// Search archives with a wildcard query
    Search {
        /// Directory holding archive directories
        archives_dir: PathBuf,
        /// Wildcard query string
        query: String,
        /// Only messages with timestamp >= this epoch millisecond
        #[arg(long)]
        tge: Option<i64>,
        /// Only messages with timestamp <= this epoch millisecond
        #[arg(long)]
        tle: Option<i64>,
        #[arg(long)]
        ignore_case: bool,
        /// Restrict the search to one archive ID
        #[arg(long)]
        archive_id: Option<String>,
        /// Stop after this many matches
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Compress {
            output_dir,
            inputs,
            target_segment_size,
            compression_level,
            group_id,
            global_db,
        } => compress(
            output_dir,
            inputs,
            target_segment_size,
            compression_level,
            group_id,
            global_db,
        ),
        Command::Extract { archive } => extract(archive),
        Command::Search {
            archives_dir,
            query,
            tge,
            tle,
            ignore_case,
            archive_id,
            limit,
        } => search(archives_dir, query, tge, tle, ignore_case, archive_id, limit),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn compress(
    output_dir: PathBuf,
    inputs: Vec<PathBuf>,
    target_segment_size: u64,
    compression_level: i32,
    group_id: u64,
    global_db: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let global: Box<dyn logcask_archive::GlobalMetadataDb> = match global_db {
        Some(uri) => Box::new(JsonGlobalMetadataDb::from_uri(&uri)?),
        None => Box::new(InMemoryGlobalMetadataDb::default()),
    };

    let mut writer = ArchiveWriter::open(
        WriterConfig {
            output_dir,
            target_segment_uncompressed_size: target_segment_size,
            compression_level,
            ..WriterConfig::default()
        },
        TimestampPatternSet::known_patterns(),
        global,
    )?;

    for input in &inputs {
        let reader = BufReader::new(std::fs::File::open(input)?);
        writer.create_and_open_file(&input.display().to_string(), group_id, Uuid::new_v4(), 0);
        for line in reader.lines() {
            writer.ingest_line(&line?)?;
        }
        writer.append_file_to_segment()?;
    }

    println!("{}", writer.id());
    writer.close()?;
    Ok(())
}

fn extract(archive: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut reader = ArchiveReader::open(&archive)?;
    let files = reader.files().to_vec();
    let stdout = std::io::stdout();
    for meta in &files {
        let mut out = stdout.lock();
        reader.extract_file(meta, |line| {
            use std::io::Write;
            let _ = writeln!(out, "{}", line);
        })?;
    }
    Ok(())
}

fn search(
    archives_dir: PathBuf,
    query_string: String,
    tge: Option<i64>,
    tle: Option<i64>,
    ignore_case: bool,
    archive_id: Option<String>,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let begin_ts = tge.unwrap_or(EPOCH_MIN);
    let end_ts = tle.unwrap_or(EPOCH_MAX);
    let limit = limit.unwrap_or(usize::MAX);

    let archive_paths: Vec<PathBuf> = match archive_id {
        Some(id) => vec![archives_dir.join(id)],
        None => {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(&archives_dir)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect();
            paths.sort();
            paths
        }
    };

    let mut sink = StdoutSink;
    let mut remaining = limit;
    let mut any_failed = false;

    for path in &archive_paths {
        if remaining == 0 {
            break;
        }
        let mut reader = match ArchiveReader::open(path) {
            Ok(reader) => reader,
            Err(e) => {
                error!(archive = %path.display(), error = %e, "failed to open archive");
                any_failed = true;
                continue;
            }
        };
        let Some(query) = process_raw_query(
            reader.logtype_dict(),
            reader.var_dict(),
            &query_string,
            begin_ts,
            end_ts,
            ignore_case,
        ) else {
            continue;
        };
        let n = search_archive(&mut reader, &query, remaining, &mut sink)?;
        remaining -= n;
    }

    if any_failed {
        return Err("one or more archives could not be opened".into());
    }
    Ok(())
}
