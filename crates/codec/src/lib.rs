//! The message codec: the reversible transformation between a raw log
//! line and `(logtype, encoded_vars[], dict_var_ids[])`.
//!
//! - [`tokens`] finds variable tokens in raw text.
//! - [`encoded`] packs numeric variables into fixed-width integers so
//!   they can be compared without a dictionary lookup, and packs
//!   dictionary IDs (plus a segment hint) into the same slot width.
//! - [`message`] composes the two into whole-message encode/decode with
//!   dictionary access injected as closures, so this crate stays
//!   independent of the archive.

pub mod encoded;
pub mod message;
pub mod tokens;

pub use encoded::{
    convert_four_byte_float_to_eight, decode_dict_var_slot, decode_float_var,
    decode_float_var_four, decode_integer_var, decode_integer_var_four, encode_dict_var_slot,
    encode_float_token, encode_float_token_four, encode_integer_token, encode_integer_token_four,
    is_variable_placeholder, VariablePlaceholder, ESCAPE_BYTE, PLACEHOLDER_DICTIONARY,
    PLACEHOLDER_FLOAT, PLACEHOLDER_INTEGER,
};
pub use message::{
    append_constant_to_logtype, decode_message, encode_message, placeholder_positions,
    replay_logtype, DecodeError, EncodedMessage, LogtypeEvent,
};
