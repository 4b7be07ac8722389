//! IR stream serialization.
//!
//! `IrSerializer` produces a complete stream: magic number, JSON
//! preamble, one event group per message, and the end-of-IR tag on
//! `finish`. Message encoding mirrors the archive codec — same
//! tokenization, same numeric encodings — but dictionary variables are
//! written as literal strings since an IR stream carries no dictionary.
//!
//! The four-byte variant emits each timestamp as a signed delta from the
//! previous one, in the narrowest width that fits; negative deltas are
//! first-class (out-of-order producers exist).

use logcask_codec::message::append_constant_to_logtype;
use logcask_codec::tokens::next_variable_bounds;
use logcask_codec::{
    encode_float_token, encode_float_token_four, encode_integer_token, encode_integer_token_four,
    PLACEHOLDER_DICTIONARY, PLACEHOLDER_FLOAT, PLACEHOLDER_INTEGER,
};
use logcask_core::Epoch;

use crate::error::IrError;
use crate::protocol::*;

pub struct IrSerializer {
    variant: IrVariant,
    buf: Vec<u8>,
    prev_ts: Epoch,
    finished: bool,
}

impl IrSerializer {
    /// Starts an eight-byte stream.
    pub fn eight_byte(
        timestamp_pattern: &str,
        timestamp_pattern_syntax: &str,
        time_zone_id: &str,
    ) -> Result<Self, IrError> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&MAGIC_EIGHT_BYTE);
        let metadata = serde_json::json!({
            VERSION_KEY: VERSION_VALUE,
            TIMESTAMP_PATTERN_KEY: timestamp_pattern,
            TIMESTAMP_PATTERN_SYNTAX_KEY: timestamp_pattern_syntax,
            TZ_ID_KEY: time_zone_id,
        });
        write_metadata(&mut buf, &metadata)?;
        Ok(IrSerializer {
            variant: IrVariant::EightByte,
            buf,
            prev_ts: 0,
            finished: false,
        })
    }

    /// Starts a four-byte stream with the given reference timestamp.
    pub fn four_byte(
        timestamp_pattern: &str,
        timestamp_pattern_syntax: &str,
        time_zone_id: &str,
        reference_ts: Epoch,
    ) -> Result<Self, IrError> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&MAGIC_FOUR_BYTE);
        let metadata = serde_json::json!({
            VERSION_KEY: VERSION_VALUE,
            TIMESTAMP_PATTERN_KEY: timestamp_pattern,
            TIMESTAMP_PATTERN_SYNTAX_KEY: timestamp_pattern_syntax,
            TZ_ID_KEY: time_zone_id,
            REFERENCE_TIMESTAMP_KEY: reference_ts.to_string(),
        });
        write_metadata(&mut buf, &metadata)?;
        Ok(IrSerializer {
            variant: IrVariant::FourByte,
            buf,
            prev_ts: reference_ts,
            finished: false,
        })
    }

    pub fn variant(&self) -> IrVariant {
        self.variant
    }

    /// Serializes one `(timestamp, message)` event group.
    pub fn add_message(&mut self, ts: Epoch, text: &str) -> Result<(), IrError> {
        assert!(!self.finished, "IR stream already finished");

        let bytes = text.as_bytes();
        let mut logtype: Vec<u8> = Vec::with_capacity(bytes.len());
        let mut last_end = 0usize;
        let mut begin = 0usize;
        let mut end = 0usize;

        while next_variable_bounds(bytes, &mut begin, &mut end) {
            append_constant_to_logtype(&bytes[last_end..begin], &mut logtype);
            last_end = end;

            let token = &text[begin..end];
            match self.variant {
                IrVariant::EightByte => {
                    if let Some(v) = encode_integer_token(token) {
                        logtype.push(PLACEHOLDER_INTEGER);
                        self.write_var_eight(v);
                    } else if let Some(v) = encode_float_token(token) {
                        logtype.push(PLACEHOLDER_FLOAT);
                        self.write_var_eight(v);
                    } else {
                        logtype.push(PLACEHOLDER_DICTIONARY);
                        self.write_dict_var(token)?;
                    }
                }
                IrVariant::FourByte => {
                    if let Some(v) = encode_integer_token_four(token) {
                        logtype.push(PLACEHOLDER_INTEGER);
                        self.write_var_four(v);
                    } else if let Some(v) = encode_float_token_four(token) {
                        logtype.push(PLACEHOLDER_FLOAT);
                        self.write_var_four(v);
                    } else {
                        logtype.push(PLACEHOLDER_DICTIONARY);
                        self.write_dict_var(token)?;
                    }
                }
            }
        }
        append_constant_to_logtype(&bytes[last_end..], &mut logtype);

        self.write_logtype(&logtype)?;
        self.write_timestamp(ts);
        Ok(())
    }

    /// Appends the end-of-IR tag and returns the stream bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(TAG_END_OF_IR);
        self.finished = true;
        self.buf
    }

    /// The bytes produced so far (no terminator).
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn write_var_eight(&mut self, v: i64) {
        self.buf.push(TAG_VAR_EIGHT_BYTE);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_var_four(&mut self, v: i32) {
        self.buf.push(TAG_VAR_FOUR_BYTE);
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_dict_var(&mut self, value: &str) -> Result<(), IrError> {
        write_length_tagged(
            &mut self.buf,
            value.as_bytes(),
            TAG_DICT_VAR_LEN_U8,
            TAG_DICT_VAR_LEN_U16,
            TAG_DICT_VAR_LEN_U32,
        )
    }

    fn write_logtype(&mut self, logtype: &[u8]) -> Result<(), IrError> {
        write_length_tagged(
            &mut self.buf,
            logtype,
            TAG_LOGTYPE_LEN_U8,
            TAG_LOGTYPE_LEN_U16,
            TAG_LOGTYPE_LEN_U32,
        )
    }

    fn write_timestamp(&mut self, ts: Epoch) {
        match self.variant {
            IrVariant::EightByte => {
                self.buf.push(TAG_TS_FULL_I64);
                self.buf.extend_from_slice(&ts.to_le_bytes());
            }
            IrVariant::FourByte => {
                let delta = ts.wrapping_sub(self.prev_ts);
                self.prev_ts = ts;
                if let Ok(d) = i8::try_from(delta) {
                    self.buf.push(TAG_TS_DELTA_I8);
                    self.buf.extend_from_slice(&d.to_le_bytes());
                } else if let Ok(d) = i16::try_from(delta) {
                    self.buf.push(TAG_TS_DELTA_I16);
                    self.buf.extend_from_slice(&d.to_le_bytes());
                } else if let Ok(d) = i32::try_from(delta) {
                    self.buf.push(TAG_TS_DELTA_I32);
                    self.buf.extend_from_slice(&d.to_le_bytes());
                } else {
                    self.buf.push(TAG_TS_DELTA_I64);
                    self.buf.extend_from_slice(&delta.to_le_bytes());
                }
            }
        }
    }
}

fn write_metadata(buf: &mut Vec<u8>, metadata: &serde_json::Value) -> Result<(), IrError> {
    let raw = serde_json::to_vec(metadata).map_err(|_| IrError::CorruptedMetadata)?;
    buf.push(TAG_METADATA_JSON);
    if let Ok(len) = u8::try_from(raw.len()) {
        buf.push(TAG_METADATA_LEN_U8);
        buf.push(len);
    } else if let Ok(len) = u16::try_from(raw.len()) {
        buf.push(TAG_METADATA_LEN_U16);
        buf.extend_from_slice(&len.to_le_bytes());
    } else {
        return Err(IrError::CorruptedMetadata);
    }
    buf.extend_from_slice(&raw);
    Ok(())
}

fn write_length_tagged(
    buf: &mut Vec<u8>,
    payload: &[u8],
    tag_u8: u8,
    tag_u16: u8,
    tag_u32: u8,
) -> Result<(), IrError> {
    if let Ok(len) = u8::try_from(payload.len()) {
        buf.push(tag_u8);
        buf.push(len);
    } else if let Ok(len) = u16::try_from(payload.len()) {
        buf.push(tag_u16);
        buf.extend_from_slice(&len.to_le_bytes());
    } else if let Ok(len) = u32::try_from(payload.len()) {
        buf.push(tag_u32);
        buf.extend_from_slice(&len.to_le_bytes());
    } else {
        return Err(IrError::DecodeError("payload exceeds u32 length".into()));
    }
    buf.extend_from_slice(payload);
    Ok(())
}
