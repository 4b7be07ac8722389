//! Whole-message encode and decode.
//!
//! Encoding factors a raw line into a logtype (static text with variable
//! tokens replaced by placeholder bytes) and one encoded slot per
//! variable. Dictionary insertion is injected as a closure so the codec
//! does not depend on the archive's dictionary machinery; the archive and
//! the IR serializer both drive this module with their own closures.
//!
//! Decoding replays a logtype against its variables. [`replay_logtype`]
//! is the shared walk — it emits one [`LogtypeEvent`] per static span or
//! placeholder — and `decode_message` specializes it for archive columns
//! where dictionary variables are ID slots. The IR decoder drives the
//! same walk with inline dictionary strings.

use logcask_core::{SegmentId, VariableId};
use thiserror::Error;

use crate::encoded::{
    decode_dict_var_slot, decode_float_var, decode_integer_var, encode_dict_var_slot,
    encode_float_token, encode_integer_token, is_variable_placeholder, ESCAPE_BYTE,
    PLACEHOLDER_DICTIONARY, PLACEHOLDER_FLOAT, PLACEHOLDER_INTEGER,
};
use crate::tokens::next_variable_bounds;

/// Result of encoding one message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedMessage {
    /// Static text with placeholder bytes; literal placeholder or escape
    /// bytes in the text are escape-prefixed.
    pub logtype: Vec<u8>,
    /// One slot per variable, in token order.
    pub encoded_vars: Vec<i64>,
    /// IDs of the dictionary variables this message referenced, in token
    /// order.
    pub dict_var_ids: Vec<VariableId>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The logtype references more variables than the message carries.
    #[error("logtype expects more variables than provided ({placeholders} > {slots})")]
    TooFewVariables { placeholders: usize, slots: usize },

    /// A dictionary slot references an ID the dictionary cannot resolve.
    #[error("unknown dictionary variable id {0}")]
    UnknownDictVar(VariableId),

    /// The logtype ends with a dangling escape byte.
    #[error("logtype ends with a dangling escape")]
    DanglingEscape,

    /// The reconstructed message is not valid UTF-8 (stored logtype was
    /// damaged).
    #[error("decoded message is not valid UTF-8")]
    InvalidUtf8,
}

/// One step of a logtype replay.
#[derive(Debug, PartialEq, Eq)]
pub enum LogtypeEvent<'a> {
    /// A span of static text (escape prefixes already removed).
    Constant(&'a [u8]),
    /// An integer placeholder: consume the next encoded slot.
    Integer,
    /// A float placeholder: consume the next encoded slot.
    Float,
    /// A dictionary placeholder: consume the next dictionary variable.
    Dictionary,
}

/// Appends `constant` to `logtype`, escape-prefixing any byte that would
/// otherwise read as a placeholder or escape.
pub fn append_constant_to_logtype(constant: &[u8], logtype: &mut Vec<u8>) {
    for &b in constant {
        if is_variable_placeholder(b) || b == ESCAPE_BYTE {
            logtype.push(ESCAPE_BYTE);
        }
        logtype.push(b);
    }
}

/// Positions of unescaped placeholder bytes in `logtype`, as stored in
/// logtype dictionary entries for fast replay.
pub fn placeholder_positions(logtype: &[u8]) -> Vec<u32> {
    let mut positions = Vec::new();
    let mut i = 0;
    while i < logtype.len() {
        let b = logtype[i];
        if b == ESCAPE_BYTE {
            i += 2;
            continue;
        }
        if is_variable_placeholder(b) {
            positions.push(i as u32);
        }
        i += 1;
    }
    positions
}

/// Encodes a raw message.
///
/// `add_dict_var` is called for each variable that cannot be encoded
/// numerically and must return its dictionary ID. `segment_hint` is
/// packed into dictionary slots (the segment the message's file is
/// expected to join).
pub fn encode_message<F, E>(
    text: &str,
    segment_hint: Option<SegmentId>,
    mut add_dict_var: F,
) -> Result<EncodedMessage, E>
where
    F: FnMut(&str) -> Result<VariableId, E>,
{
    let bytes = text.as_bytes();
    let mut msg = EncodedMessage::default();
    let mut last_end = 0usize;
    let mut begin = 0usize;
    let mut end = 0usize;

    while next_variable_bounds(bytes, &mut begin, &mut end) {
        append_constant_to_logtype(&bytes[last_end..begin], &mut msg.logtype);
        last_end = end;

        let token = &text[begin..end];
        if let Some(encoded) = encode_integer_token(token) {
            msg.logtype.push(PLACEHOLDER_INTEGER);
            msg.encoded_vars.push(encoded);
        } else if let Some(encoded) = encode_float_token(token) {
            msg.logtype.push(PLACEHOLDER_FLOAT);
            msg.encoded_vars.push(encoded);
        } else {
            let var_id = add_dict_var(token)?;
            msg.logtype.push(PLACEHOLDER_DICTIONARY);
            msg.encoded_vars
                .push(encode_dict_var_slot(var_id, segment_hint));
            msg.dict_var_ids.push(var_id);
        }
    }
    append_constant_to_logtype(&bytes[last_end..], &mut msg.logtype);

    Ok(msg)
}

/// Walks a logtype, emitting one event per static span or placeholder,
/// in order. Escaped bytes are delivered as constants without their
/// escape prefix.
pub fn replay_logtype<E, F>(logtype: &[u8], mut handler: F) -> Result<(), E>
where
    F: FnMut(LogtypeEvent<'_>) -> Result<(), E>,
    E: From<DecodeError>,
{
    let mut constant_begin = 0usize;
    let mut i = 0usize;
    while i < logtype.len() {
        match logtype[i] {
            PLACEHOLDER_INTEGER => {
                handler(LogtypeEvent::Constant(&logtype[constant_begin..i]))?;
                constant_begin = i + 1;
                handler(LogtypeEvent::Integer)?;
            }
            PLACEHOLDER_FLOAT => {
                handler(LogtypeEvent::Constant(&logtype[constant_begin..i]))?;
                constant_begin = i + 1;
                handler(LogtypeEvent::Float)?;
            }
            PLACEHOLDER_DICTIONARY => {
                handler(LogtypeEvent::Constant(&logtype[constant_begin..i]))?;
                constant_begin = i + 1;
                handler(LogtypeEvent::Dictionary)?;
            }
            ESCAPE_BYTE => {
                if i + 1 >= logtype.len() {
                    return Err(DecodeError::DanglingEscape.into());
                }
                handler(LogtypeEvent::Constant(&logtype[constant_begin..i]))?;
                // The byte after the escape is static text regardless of
                // its value
                constant_begin = i + 1;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    handler(LogtypeEvent::Constant(&logtype[constant_begin..]))?;
    Ok(())
}

/// Decodes a message from archive columns: logtype bytes, encoded slots,
/// and a dictionary lookup for ID slots.
pub fn decode_message<F>(
    logtype: &[u8],
    encoded_vars: &[i64],
    mut lookup_dict_var: F,
) -> Result<String, DecodeError>
where
    F: FnMut(VariableId) -> Option<String>,
{
    let mut out: Vec<u8> = Vec::with_capacity(logtype.len() + encoded_vars.len() * 8);
    let mut next_slot = 0usize;

    let mut take_slot = |next_slot: &mut usize| -> Result<i64, DecodeError> {
        match encoded_vars.get(*next_slot) {
            Some(&slot) => {
                *next_slot += 1;
                Ok(slot)
            }
            None => Err(DecodeError::TooFewVariables {
                placeholders: *next_slot + 1,
                slots: encoded_vars.len(),
            }),
        }
    };

    replay_logtype::<DecodeError, _>(logtype, |event| {
        match event {
            LogtypeEvent::Constant(span) => out.extend_from_slice(span),
            LogtypeEvent::Integer => {
                let slot = take_slot(&mut next_slot)?;
                out.extend_from_slice(decode_integer_var(slot).as_bytes());
            }
            LogtypeEvent::Float => {
                let slot = take_slot(&mut next_slot)?;
                out.extend_from_slice(decode_float_var(slot).as_bytes());
            }
            LogtypeEvent::Dictionary => {
                let slot = take_slot(&mut next_slot)?;
                let (var_id, _segment_hint) = decode_dict_var_slot(slot);
                let value =
                    lookup_dict_var(var_id).ok_or(DecodeError::UnknownDictVar(var_id))?;
                out.extend_from_slice(value.as_bytes());
            }
        }
        Ok(())
    })?;

    String::from_utf8(out).map_err(|_| DecodeError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::convert::Infallible;

    /// Tiny in-memory dictionary for round-trip tests.
    #[derive(Default)]
    struct TestDict {
        by_value: HashMap<String, VariableId>,
        by_id: Vec<String>,
    }

    impl TestDict {
        fn add(&mut self, value: &str) -> VariableId {
            if let Some(&id) = self.by_value.get(value) {
                return id;
            }
            let id = self.by_id.len() as VariableId;
            self.by_value.insert(value.to_string(), id);
            self.by_id.push(value.to_string());
            id
        }

        fn get(&self, id: VariableId) -> Option<String> {
            self.by_id.get(id as usize).cloned()
        }
    }

    fn roundtrip(text: &str) -> (EncodedMessage, String) {
        let mut dict = TestDict::default();
        let msg = encode_message::<_, Infallible>(text, None, |tok| Ok(dict.add(tok)))
            .unwrap();
        let decoded = decode_message(&msg.logtype, &msg.encoded_vars, |id| dict.get(id)).unwrap();
        (msg, decoded)
    }

    #[test]
    fn roundtrip_static_only() {
        let (msg, decoded) = roundtrip("disconnected");
        assert_eq!(decoded, "disconnected");
        assert!(msg.encoded_vars.is_empty());
        assert!(msg.dict_var_ids.is_empty());
    }

    #[test]
    fn roundtrip_numeric_variables() {
        let (msg, decoded) = roundtrip("transferred 1048576 bytes in 1.23 seconds");
        assert_eq!(decoded, "transferred 1048576 bytes in 1.23 seconds");
        assert_eq!(msg.encoded_vars.len(), 2);
        // Numerically encoded: no dictionary entries
        assert!(msg.dict_var_ids.is_empty());
        assert_eq!(
            placeholder_positions(&msg.logtype).len(),
            msg.encoded_vars.len()
        );
    }

    #[test]
    fn roundtrip_dictionary_variable() {
        let (msg, decoded) = roundtrip("connected to host 10.1.2.3 port 443");
        assert_eq!(decoded, "connected to host 10.1.2.3 port 443");
        // "10.1.2.3" -> dictionary, "443" -> integer
        assert_eq!(msg.encoded_vars.len(), 2);
        assert_eq!(msg.dict_var_ids.len(), 1);
    }

    #[test]
    fn identical_messages_encode_identically() {
        let text = "job 17 finished in 0.5 s on node-3";
        let (a, _) = roundtrip(text);
        let (b, _) = roundtrip(text);
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrip_text_containing_placeholder_bytes() {
        let text = "weird \u{11} bytes \u{13} and \\ backslash v=7";
        let (msg, decoded) = roundtrip(text);
        assert_eq!(decoded, text);
        // Only the real variable got a placeholder
        assert_eq!(placeholder_positions(&msg.logtype).len(), 1);
    }

    #[test]
    fn logtypes_share_across_variable_values() {
        let mut dict = TestDict::default();
        let a = encode_message::<_, Infallible>("took 15 ms", None, |t| Ok(dict.add(t))).unwrap();
        let b = encode_message::<_, Infallible>("took 92 ms", None, |t| Ok(dict.add(t))).unwrap();
        assert_eq!(a.logtype, b.logtype);
        assert_ne!(a.encoded_vars, b.encoded_vars);
    }

    #[test]
    fn float_text_is_preserved_exactly() {
        let (_, d1) = roundtrip("ratio 1.0 done");
        let (_, d2) = roundtrip("ratio 1.00 done");
        assert_eq!(d1, "ratio 1.0 done");
        assert_eq!(d2, "ratio 1.00 done");
    }

    #[test]
    fn segment_hint_travels_in_dict_slots() {
        let mut dict = TestDict::default();
        let msg =
            encode_message::<_, Infallible>("src=server9x up", Some(6), |t| Ok(dict.add(t)))
                .unwrap();
        assert_eq!(msg.dict_var_ids.len(), 1);
        let (var_id, hint) = decode_dict_var_slot(msg.encoded_vars[0]);
        assert_eq!(var_id, msg.dict_var_ids[0]);
        assert_eq!(hint, Some(6));
    }

    #[test]
    fn decode_detects_missing_slots() {
        let (msg, _) = roundtrip("code 404 from 10.0.0.1");
        let err = decode_message(&msg.logtype, &msg.encoded_vars[..1], |_| None).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TooFewVariables { .. } | DecodeError::UnknownDictVar(_)
        ));
    }

    #[test]
    fn decode_detects_unknown_dict_id() {
        let mut dict = TestDict::default();
        let msg = encode_message::<_, Infallible>("host=alpha up", None, |t| Ok(dict.add(t)))
            .unwrap();
        let err = decode_message(&msg.logtype, &msg.encoded_vars, |_| None).unwrap_err();
        assert_eq!(err, DecodeError::UnknownDictVar(msg.dict_var_ids[0]));
    }

    #[test]
    fn replay_emits_events_in_order() {
        let (msg, _) = roundtrip("a 1 b 2.5 c=xyz9z d");
        let mut kinds = Vec::new();
        replay_logtype::<DecodeError, _>(&msg.logtype, |ev| {
            kinds.push(match ev {
                LogtypeEvent::Constant(_) => 'c',
                LogtypeEvent::Integer => 'i',
                LogtypeEvent::Float => 'f',
                LogtypeEvent::Dictionary => 'd',
            });
            Ok(())
        })
        .unwrap();
        let vars: String = kinds.iter().filter(|&&k| k != 'c').collect();
        assert_eq!(vars, "ifd");
    }

    #[test]
    fn dangling_escape_is_rejected() {
        let bad = vec![b'a', ESCAPE_BYTE];
        let err = decode_message(&bad, &[], |_| None).unwrap_err();
        assert_eq!(err, DecodeError::DanglingEscape);
    }
}
