//! The IR (intermediate representation) stream codec: a portable byte
//! sequence encoding a log stream in the same shape as archive messages
//! (timestamp, logtype, encoded variables), used to ship pre-encoded
//! logs into the archive from remote producers.
//!
//! Two variants exist, selected by magic number: eight-byte encoded
//! variables with absolute timestamps, and four-byte encoded variables
//! with delta timestamps for bandwidth-constrained producers.

pub mod decode;
pub mod encode;
pub mod error;
pub mod protocol;

pub use decode::{get_encoding_type, IrBuffer, IrStreamReader, TimestampInfo};
pub use encode::IrSerializer;
pub use error::IrError;
pub use protocol::IrVariant;
