//! IR stream protocol constants.
//!
//! An IR stream is a self-describing byte sequence:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Magic number (4 bytes)                       │  selects the variant
//! ├──────────────────────────────────────────────┤
//! │ 0x01  metadata tag                           │
//! │ 0x11/0x12  length tag (u8 / u16 LE)          │
//! │ UTF-8 JSON metadata                          │
//! ├──────────────────────────────────────────────┤
//! │ events…                                      │
//! │   per message: variables, logtype, timestamp │
//! ├──────────────────────────────────────────────┤
//! │ 0x00  end-of-IR tag                          │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All multi-byte payloads are little-endian. The eight-byte variant
//! carries absolute `i64` timestamps; the four-byte variant carries
//! signed deltas from the previous timestamp (the preamble supplies the
//! starting reference), sized to the smallest fitting width.

/// Magic number of the eight-byte-encoded variant.
pub const MAGIC_EIGHT_BYTE: [u8; 4] = [0xFD, 0x2F, 0xB5, 0x30];
/// Magic number of the four-byte-encoded variant.
pub const MAGIC_FOUR_BYTE: [u8; 4] = [0xFD, 0x2F, 0xB5, 0x29];
/// Length of the magic number.
pub const MAGIC_LEN: usize = 4;

/// Terminates the stream.
pub const TAG_END_OF_IR: u8 = 0x00;
/// Introduces the JSON metadata preamble.
pub const TAG_METADATA_JSON: u8 = 0x01;
/// Metadata length follows as u8.
pub const TAG_METADATA_LEN_U8: u8 = 0x11;
/// Metadata length follows as u16 LE.
pub const TAG_METADATA_LEN_U16: u8 = 0x12;

/// Encoded variable, four-byte payload (i32 LE).
pub const TAG_VAR_FOUR_BYTE: u8 = 0x18;
/// Encoded variable, eight-byte payload (i64 LE).
pub const TAG_VAR_EIGHT_BYTE: u8 = 0x19;

/// Dictionary-variable literal, length as u8.
pub const TAG_DICT_VAR_LEN_U8: u8 = 0x21;
/// Dictionary-variable literal, length as u16 LE.
pub const TAG_DICT_VAR_LEN_U16: u8 = 0x22;
/// Dictionary-variable literal, length as u32 LE.
pub const TAG_DICT_VAR_LEN_U32: u8 = 0x23;

/// Logtype string, length as u8.
pub const TAG_LOGTYPE_LEN_U8: u8 = 0x31;
/// Logtype string, length as u16 LE.
pub const TAG_LOGTYPE_LEN_U16: u8 = 0x32;
/// Logtype string, length as u32 LE.
pub const TAG_LOGTYPE_LEN_U32: u8 = 0x33;

/// Timestamp delta as i8 (four-byte variant).
pub const TAG_TS_DELTA_I8: u8 = 0x41;
/// Timestamp delta as i16 LE (four-byte variant).
pub const TAG_TS_DELTA_I16: u8 = 0x42;
/// Timestamp delta as i32 LE (four-byte variant).
pub const TAG_TS_DELTA_I32: u8 = 0x43;
/// Timestamp delta as i64 LE (four-byte variant).
pub const TAG_TS_DELTA_I64: u8 = 0x44;
/// Absolute timestamp as i64 LE (eight-byte variant).
pub const TAG_TS_FULL_I64: u8 = 0x45;

/// Metadata keys.
pub const VERSION_KEY: &str = "VERSION";
pub const TIMESTAMP_PATTERN_KEY: &str = "TIMESTAMP_PATTERN";
pub const TIMESTAMP_PATTERN_SYNTAX_KEY: &str = "TIMESTAMP_PATTERN_SYNTAX";
pub const TZ_ID_KEY: &str = "TZ_ID";
pub const REFERENCE_TIMESTAMP_KEY: &str = "REFERENCE_TIMESTAMP";

/// The stream version this implementation produces and accepts.
pub const VERSION_VALUE: &str = "0.1.0";

/// Which encoding a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrVariant {
    FourByte,
    EightByte,
}
