use std::io;

use super::Amf0Marker;

/// Errors that can occur while decoding an AMF0 value.
#[derive(Debug, thiserror::Error)]
pub enum Amf0ReadError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("unknown marker: {0}")]
    UnknownMarker(u8),
    #[error("unsupported type: {0:?}")]
    UnsupportedType(Amf0Marker),
    #[error("wrong type, expected {expected:?} got {got:?}")]
    WrongType { expected: Amf0Marker, got: Amf0Marker },
    #[error("invalid utf8 in amf0 string: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Errors that can occur while encoding an AMF0 value.
#[derive(Debug, thiserror::Error)]
pub enum Amf0WriteError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("normal string too long for amf0 (use LongString): {0} bytes")]
    StringTooLong(usize),
}
