//! IR codec conformance: cursor-retry behavior on truncated prefixes and
//! a pinned reference stream for the four-byte variant's fixed
//! boundaries.

use logcask_ir::decode::{eight_byte, four_byte};
use logcask_ir::protocol::*;
use logcask_ir::{get_encoding_type, IrBuffer, IrError, IrSerializer, IrStreamReader};

const PATTERN: &str = "%Y-%m-%dT%H:%M:%S.%3";
const SYNTAX: &str = "yyyy-MM-dd'T'HH:mm:ss.SSS";
const TZ: &str = "UTC";

fn sample_eight_byte_stream() -> Vec<u8> {
    let mut ser = IrSerializer::eight_byte(PATTERN, SYNTAX, TZ).unwrap();
    ser.add_message(1_600_000_000_000, "request 42 served in 3.5 ms")
        .unwrap();
    ser.add_message(1_600_000_000_250, "worker w-7 idle").unwrap();
    ser.finish()
}

#[test]
fn every_prefix_is_incomplete_or_consistent() {
    let stream = sample_eight_byte_stream();

    // Fully decode the intact stream for reference
    let mut reference = Vec::new();
    let mut reader = IrStreamReader::new(&stream).unwrap();
    while let Some(pair) = reader.next_message().unwrap() {
        reference.push(pair);
    }
    assert_eq!(reference.len(), 2);

    for cut in 0..stream.len() {
        let prefix = &stream[..cut];
        let mut buf = IrBuffer::new(prefix);

        let variant = match get_encoding_type(&mut buf) {
            Ok(v) => v,
            Err(IrError::IncompleteIr) => {
                assert_eq!(buf.cursor_pos(), 0, "cursor moved on incomplete magic");
                continue;
            }
            Err(e) => panic!("unexpected error on prefix {}: {:?}", cut, e),
        };
        assert_eq!(variant, IrVariant::EightByte);

        match eight_byte::decode_preamble(&mut buf) {
            Ok(_) => {}
            Err(IrError::IncompleteIr) => {
                assert_eq!(buf.cursor_pos(), MAGIC_LEN, "cursor moved on incomplete preamble");
                continue;
            }
            Err(e) => panic!("unexpected error on prefix {}: {:?}", cut, e),
        }

        // Decode as many whole messages as the prefix holds; each must
        // match the reference sequence, and an incomplete tail must not
        // advance the cursor.
        let mut decoded = 0usize;
        loop {
            let before = buf.cursor_pos();
            match eight_byte::decode_next_message(&mut buf) {
                Ok(pair) => {
                    assert_eq!(pair, reference[decoded]);
                    decoded += 1;
                }
                Err(IrError::Eof) => break,
                Err(IrError::IncompleteIr) => {
                    assert_eq!(buf.cursor_pos(), before, "cursor moved on incomplete message");
                    break;
                }
                Err(e) => panic!("unexpected error on prefix {}: {:?}", cut, e),
            }
        }
    }
}

#[test]
fn corrupted_magic_is_detected() {
    let mut stream = sample_eight_byte_stream();
    stream[0] = 0x02;
    let mut buf = IrBuffer::new(&stream);
    assert_eq!(get_encoding_type(&mut buf), Err(IrError::CorruptedIr));
}

#[test]
fn corrupted_preamble_tag_is_detected() {
    let mut stream = sample_eight_byte_stream();
    stream[MAGIC_LEN] = 0x7F; // clobber the metadata tag
    let mut buf = IrBuffer::new(&stream);
    get_encoding_type(&mut buf).unwrap();
    assert_eq!(
        eight_byte::decode_preamble(&mut buf),
        Err(IrError::CorruptedIr)
    );
}

#[test]
fn unsupported_version_is_reported() {
    let stream = sample_eight_byte_stream();
    let json_start = stream
        .windows(VERSION_VALUE.len())
        .position(|w| w == VERSION_VALUE.as_bytes())
        .expect("version literal present in metadata");
    let mut tampered = stream.clone();
    tampered[json_start] = b'9';

    let mut buf = IrBuffer::new(&tampered);
    get_encoding_type(&mut buf).unwrap();
    assert!(matches!(
        eight_byte::decode_preamble(&mut buf),
        Err(IrError::UnsupportedVersion(_))
    ));
}

/// Pins the four-byte event layout byte for byte: one message, one
/// i32-encoded integer variable, a one-placeholder logtype, and an i8
/// timestamp delta.
#[test]
fn four_byte_reference_event_bytes() {
    let mut ser = IrSerializer::four_byte(PATTERN, SYNTAX, TZ, 100).unwrap();
    ser.add_message(103, "n 7").unwrap();
    let stream = ser.finish();

    // Locate the event group: it follows the metadata payload.
    let mut buf = IrBuffer::new(&stream);
    get_encoding_type(&mut buf).unwrap();
    four_byte::decode_preamble(&mut buf).unwrap();
    let event_start = buf.cursor_pos();

    let expected: Vec<u8> = vec![
        TAG_VAR_FOUR_BYTE,
        0x07,
        0x00,
        0x00,
        0x00, // 7 as i32 LE
        TAG_LOGTYPE_LEN_U8,
        0x03, // logtype "n \x11"
        b'n',
        b' ',
        0x11,
        TAG_TS_DELTA_I8,
        0x03, // delta 103 - 100
        TAG_END_OF_IR,
    ];
    assert_eq!(&stream[event_start..], &expected[..]);
}

#[test]
fn four_byte_i32_boundary_in_stream() {
    // 2147483647 fits the four-byte form; 2147483648 rides as a
    // dictionary literal. Both must round-trip.
    let mut ser = IrSerializer::four_byte(PATTERN, SYNTAX, TZ, 0).unwrap();
    ser.add_message(1, "a 2147483647").unwrap();
    ser.add_message(2, "b 2147483648").unwrap();
    let stream = ser.finish();

    let mut reader = IrStreamReader::new(&stream).unwrap();
    assert_eq!(
        reader.next_message().unwrap().unwrap().0,
        "a 2147483647"
    );
    assert_eq!(
        reader.next_message().unwrap().unwrap().0,
        "b 2147483648"
    );
}
