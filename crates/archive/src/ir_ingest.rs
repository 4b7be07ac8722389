//! Ingestion of pre-encoded IR streams.
//!
//! Remote producers ship logs as IR streams; this module replays a
//! stream's decoded events through the archive writer, so IR-shipped
//! logs land in the same files/segments/dictionaries as locally parsed
//! text.

use logcask_core::{GroupId, TimestampPattern};
use logcask_ir::IrStreamReader;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::writer::ArchiveWriter;

/// Replays a complete IR stream into `writer` as one file. Returns the
/// number of messages ingested.
pub fn ingest_ir_stream(
    writer: &mut ArchiveWriter,
    data: &[u8],
    orig_path: &str,
    group_id: GroupId,
) -> Result<u64> {
    let mut reader = IrStreamReader::new(data)?;

    writer.create_and_open_file(orig_path, group_id, Uuid::new_v4(), 0);
    let pattern = TimestampPattern::new(0, reader.ts_info().timestamp_pattern.clone());
    writer.change_ts_pattern(Some(&pattern));

    let mut count = 0u64;
    while let Some((text, ts)) = reader.next_message()? {
        writer.write_msg(ts, &text, text.len() as u64 + 1)?;
        count += 1;
    }
    writer.append_file_to_segment()?;

    info!(path = orig_path, messages = count, "IR stream ingested");
    Ok(count)
}
