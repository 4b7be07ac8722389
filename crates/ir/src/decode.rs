//! IR stream decoding.
//!
//! [`IrBuffer`] wraps the caller's bytes with a committed cursor and an
//! internal cursor: reads advance the internal cursor only, and the
//! committed cursor catches up when a whole unit (magic, preamble, one
//! message) decodes successfully. A failed or short read leaves the
//! committed cursor untouched, so a caller streaming from the network
//! can retry the same call after appending more bytes.
//!
//! The four-byte variant's timestamps are deltas; the decoder carries
//! the running reference timestamp and each decoded message's absolute
//! timestamp is the reference after adding its delta.

use logcask_codec::{
    convert_four_byte_float_to_eight, decode_float_var, decode_integer_var,
    decode_integer_var_four, replay_logtype, LogtypeEvent,
};
use logcask_core::Epoch;

use crate::error::IrError;
use crate::protocol::*;

/// Byte buffer with commit-on-success cursor semantics.
pub struct IrBuffer<'a> {
    data: &'a [u8],
    cursor: usize,
    internal: usize,
}

impl<'a> IrBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        IrBuffer {
            data,
            cursor: 0,
            internal: 0,
        }
    }

    pub fn cursor_pos(&self) -> usize {
        self.cursor
    }

    pub fn set_cursor_pos(&mut self, pos: usize) {
        self.cursor = pos;
    }

    fn begin(&mut self) {
        self.internal = self.cursor;
    }

    fn commit(&mut self) {
        self.cursor = self.internal;
    }

    fn try_read_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.internal + len > self.data.len() {
            return None;
        }
        let out = &self.data[self.internal..self.internal + len];
        self.internal += len;
        Some(out)
    }

    fn try_read_u8(&mut self) -> Option<u8> {
        self.try_read_slice(1).map(|s| s[0])
    }

    fn try_read_u16(&mut self) -> Option<u16> {
        self.try_read_slice(2)
            .map(|s| u16::from_le_bytes(s.try_into().unwrap()))
    }

    fn try_read_u32(&mut self) -> Option<u32> {
        self.try_read_slice(4)
            .map(|s| u32::from_le_bytes(s.try_into().unwrap()))
    }

    fn try_read_i8(&mut self) -> Option<i8> {
        self.try_read_u8().map(|b| b as i8)
    }

    fn try_read_i16(&mut self) -> Option<i16> {
        self.try_read_slice(2)
            .map(|s| i16::from_le_bytes(s.try_into().unwrap()))
    }

    fn try_read_i32(&mut self) -> Option<i32> {
        self.try_read_slice(4)
            .map(|s| i32::from_le_bytes(s.try_into().unwrap()))
    }

    fn try_read_i64(&mut self) -> Option<i64> {
        self.try_read_slice(8)
            .map(|s| i64::from_le_bytes(s.try_into().unwrap()))
    }
}

/// Timestamp metadata carried in the preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampInfo {
    pub timestamp_pattern: String,
    pub timestamp_pattern_syntax: String,
    pub time_zone_id: String,
}

/// Reads the magic number and identifies the stream variant.
pub fn get_encoding_type(buf: &mut IrBuffer<'_>) -> Result<IrVariant, IrError> {
    buf.begin();
    let magic = buf.try_read_slice(MAGIC_LEN).ok_or(IrError::IncompleteIr)?;
    let variant = if magic == MAGIC_EIGHT_BYTE {
        IrVariant::EightByte
    } else if magic == MAGIC_FOUR_BYTE {
        IrVariant::FourByte
    } else {
        return Err(IrError::CorruptedIr);
    };
    buf.commit();
    Ok(variant)
}

/// Decodes the JSON preamble shared by both variants. Returns the parsed
/// metadata document.
fn decode_metadata_json(buf: &mut IrBuffer<'_>) -> Result<serde_json::Value, IrError> {
    let tag = buf.try_read_u8().ok_or(IrError::IncompleteIr)?;
    if tag != TAG_METADATA_JSON {
        return Err(IrError::CorruptedIr);
    }
    let len = match buf.try_read_u8().ok_or(IrError::IncompleteIr)? {
        TAG_METADATA_LEN_U8 => buf.try_read_u8().ok_or(IrError::IncompleteIr)? as usize,
        TAG_METADATA_LEN_U16 => buf.try_read_u16().ok_or(IrError::IncompleteIr)? as usize,
        _ => return Err(IrError::CorruptedIr),
    };
    let raw = buf.try_read_slice(len).ok_or(IrError::IncompleteIr)?;
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|_| IrError::CorruptedMetadata)?;

    let version = value
        .get(VERSION_KEY)
        .and_then(|v| v.as_str())
        .ok_or(IrError::CorruptedMetadata)?;
    if version != VERSION_VALUE {
        return Err(IrError::UnsupportedVersion(version.to_string()));
    }
    Ok(value)
}

fn timestamp_info_from(value: &serde_json::Value) -> Result<TimestampInfo, IrError> {
    let get = |key: &str| -> Result<String, IrError> {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or(IrError::CorruptedMetadata)
    };
    Ok(TimestampInfo {
        timestamp_pattern: get(TIMESTAMP_PATTERN_KEY)?,
        timestamp_pattern_syntax: get(TIMESTAMP_PATTERN_SYNTAX_KEY)?,
        time_zone_id: get(TZ_ID_KEY)?,
    })
}

pub mod eight_byte {
    use super::*;

    /// Decodes the eight-byte variant's preamble.
    pub fn decode_preamble(buf: &mut IrBuffer<'_>) -> Result<TimestampInfo, IrError> {
        buf.begin();
        let value = decode_metadata_json(buf)?;
        let info = timestamp_info_from(&value)?;
        buf.commit();
        Ok(info)
    }

    /// Decodes the next message. `Err(Eof)` at the end-of-IR tag.
    pub fn decode_next_message(buf: &mut IrBuffer<'_>) -> Result<(String, Epoch), IrError> {
        buf.begin();
        let (logtype, encoded_vars, dict_vars, ts) = read_event_group(buf, IrVariant::EightByte)?;
        let text = assemble_message(
            &logtype,
            &encoded_vars,
            &dict_vars,
            IrVariant::EightByte,
        )?;
        buf.commit();
        Ok((text, ts))
    }
}

pub mod four_byte {
    use super::*;

    /// Decodes the four-byte variant's preamble. Returns the timestamp
    /// info and the starting reference timestamp.
    pub fn decode_preamble(buf: &mut IrBuffer<'_>) -> Result<(TimestampInfo, Epoch), IrError> {
        buf.begin();
        let value = decode_metadata_json(buf)?;
        let info = timestamp_info_from(&value)?;
        let reference_ts: Epoch = value
            .get(REFERENCE_TIMESTAMP_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or(IrError::CorruptedMetadata)?;
        buf.commit();
        Ok((info, reference_ts))
    }

    /// Decodes the next message, updating `reference_ts` by the decoded
    /// delta. The returned timestamp is the updated reference.
    pub fn decode_next_message(
        buf: &mut IrBuffer<'_>,
        reference_ts: &mut Epoch,
    ) -> Result<(String, Epoch), IrError> {
        buf.begin();
        let (logtype, encoded_vars, dict_vars, delta) = read_event_group(buf, IrVariant::FourByte)?;
        let text = assemble_message(&logtype, &encoded_vars, &dict_vars, IrVariant::FourByte)?;
        buf.commit();
        *reference_ts += delta;
        Ok((text, *reference_ts))
    }
}

/// Reads one message's events: variables, then the logtype, then the
/// timestamp (absolute for eight-byte, delta for four-byte).
fn read_event_group(
    buf: &mut IrBuffer<'_>,
    variant: IrVariant,
) -> Result<(Vec<u8>, Vec<i64>, Vec<String>, i64), IrError> {
    let mut encoded_vars: Vec<i64> = Vec::new();
    let mut dict_vars: Vec<String> = Vec::new();

    let logtype: Vec<u8> = loop {
        let tag = buf.try_read_u8().ok_or(IrError::IncompleteIr)?;
        match tag {
            TAG_END_OF_IR => return Err(IrError::Eof),
            TAG_VAR_FOUR_BYTE => {
                if variant != IrVariant::FourByte {
                    return Err(IrError::CorruptedIr);
                }
                let v = buf.try_read_i32().ok_or(IrError::IncompleteIr)?;
                encoded_vars.push(v as i64);
            }
            TAG_VAR_EIGHT_BYTE => {
                if variant != IrVariant::EightByte {
                    return Err(IrError::CorruptedIr);
                }
                let v = buf.try_read_i64().ok_or(IrError::IncompleteIr)?;
                encoded_vars.push(v);
            }
            TAG_DICT_VAR_LEN_U8 | TAG_DICT_VAR_LEN_U16 | TAG_DICT_VAR_LEN_U32 => {
                let len = match tag {
                    TAG_DICT_VAR_LEN_U8 => buf.try_read_u8().ok_or(IrError::IncompleteIr)? as usize,
                    TAG_DICT_VAR_LEN_U16 => {
                        buf.try_read_u16().ok_or(IrError::IncompleteIr)? as usize
                    }
                    _ => buf.try_read_u32().ok_or(IrError::IncompleteIr)? as usize,
                };
                let raw = buf.try_read_slice(len).ok_or(IrError::IncompleteIr)?;
                let value = std::str::from_utf8(raw)
                    .map_err(|_| IrError::DecodeError("dictionary variable not UTF-8".into()))?;
                dict_vars.push(value.to_string());
            }
            TAG_LOGTYPE_LEN_U8 | TAG_LOGTYPE_LEN_U16 | TAG_LOGTYPE_LEN_U32 => {
                let len = match tag {
                    TAG_LOGTYPE_LEN_U8 => buf.try_read_u8().ok_or(IrError::IncompleteIr)? as usize,
                    TAG_LOGTYPE_LEN_U16 => {
                        buf.try_read_u16().ok_or(IrError::IncompleteIr)? as usize
                    }
                    _ => buf.try_read_u32().ok_or(IrError::IncompleteIr)? as usize,
                };
                let raw = buf.try_read_slice(len).ok_or(IrError::IncompleteIr)?;
                break raw.to_vec();
            }
            _ => return Err(IrError::CorruptedIr),
        }
    };

    let ts_tag = buf.try_read_u8().ok_or(IrError::IncompleteIr)?;
    let ts = match (variant, ts_tag) {
        (IrVariant::EightByte, TAG_TS_FULL_I64) => {
            buf.try_read_i64().ok_or(IrError::IncompleteIr)?
        }
        (IrVariant::FourByte, TAG_TS_DELTA_I8) => {
            buf.try_read_i8().ok_or(IrError::IncompleteIr)? as i64
        }
        (IrVariant::FourByte, TAG_TS_DELTA_I16) => {
            buf.try_read_i16().ok_or(IrError::IncompleteIr)? as i64
        }
        (IrVariant::FourByte, TAG_TS_DELTA_I32) => {
            buf.try_read_i32().ok_or(IrError::IncompleteIr)? as i64
        }
        (IrVariant::FourByte, TAG_TS_DELTA_I64) => {
            buf.try_read_i64().ok_or(IrError::IncompleteIr)?
        }
        _ => return Err(IrError::CorruptedIr),
    };

    Ok((logtype, encoded_vars, dict_vars, ts))
}

/// Replays a logtype against its variables to reconstruct message text.
fn assemble_message(
    logtype: &[u8],
    encoded_vars: &[i64],
    dict_vars: &[String],
    variant: IrVariant,
) -> Result<String, IrError> {
    let mut out: Vec<u8> = Vec::with_capacity(logtype.len() + encoded_vars.len() * 8);
    let mut var_ix = 0usize;
    let mut dict_ix = 0usize;

    let mut next_encoded = |var_ix: &mut usize| -> Result<i64, IrError> {
        match encoded_vars.get(*var_ix) {
            Some(&v) => {
                *var_ix += 1;
                Ok(v)
            }
            None => Err(IrError::DecodeError(
                "logtype references more encoded variables than present".into(),
            )),
        }
    };

    replay_logtype::<IrError, _>(logtype, |event| {
        match event {
            LogtypeEvent::Constant(span) => out.extend_from_slice(span),
            LogtypeEvent::Integer => {
                let v = next_encoded(&mut var_ix)?;
                let text = match variant {
                    IrVariant::EightByte => decode_integer_var(v),
                    IrVariant::FourByte => decode_integer_var_four(v as i32),
                };
                out.extend_from_slice(text.as_bytes());
            }
            LogtypeEvent::Float => {
                let v = next_encoded(&mut var_ix)?;
                let widened = match variant {
                    IrVariant::EightByte => v,
                    IrVariant::FourByte => convert_four_byte_float_to_eight(v as i32),
                };
                out.extend_from_slice(decode_float_var(widened).as_bytes());
            }
            LogtypeEvent::Dictionary => {
                let value = dict_vars.get(dict_ix).ok_or_else(|| {
                    IrError::DecodeError(
                        "logtype references more dictionary variables than present".into(),
                    )
                })?;
                dict_ix += 1;
                out.extend_from_slice(value.as_bytes());
            }
        }
        Ok(())
    })?;

    String::from_utf8(out).map_err(|_| IrError::DecodeError("message not UTF-8".into()))
}

/// Convenience reader over a complete or growing IR byte stream: handles
/// the magic, preamble and per-variant timestamp state.
pub struct IrStreamReader<'a> {
    buf: IrBuffer<'a>,
    variant: IrVariant,
    ts_info: TimestampInfo,
    reference_ts: Epoch,
}

impl<'a> IrStreamReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, IrError> {
        let mut buf = IrBuffer::new(data);
        let variant = get_encoding_type(&mut buf)?;
        let (ts_info, reference_ts) = match variant {
            IrVariant::EightByte => (eight_byte::decode_preamble(&mut buf)?, 0),
            IrVariant::FourByte => four_byte::decode_preamble(&mut buf)?,
        };
        Ok(IrStreamReader {
            buf,
            variant,
            ts_info,
            reference_ts,
        })
    }

    pub fn variant(&self) -> IrVariant {
        self.variant
    }

    pub fn ts_info(&self) -> &TimestampInfo {
        &self.ts_info
    }

    /// Next `(message, timestamp)`, or `None` at the end-of-IR tag.
    pub fn next_message(&mut self) -> Result<Option<(String, Epoch)>, IrError> {
        let result = match self.variant {
            IrVariant::EightByte => eight_byte::decode_next_message(&mut self.buf),
            IrVariant::FourByte => {
                four_byte::decode_next_message(&mut self.buf, &mut self.reference_ts)
            }
        };
        match result {
            Ok(pair) => Ok(Some(pair)),
            Err(IrError::Eof) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
