//! AMF0 (Action Message Format 0) encoding and decoding.
//!
//! AMF0 is the metadata encoding used by FLV `onMetaData` script tags and by
//! the RTMP `connect`/`createStream` command chain. This crate only speaks
//! AMF0 — AMF3 is out of scope.

pub mod decode;
pub mod define;
pub mod encode;
mod error;

pub use decode::Amf0Decoder;
pub use define::{Amf0Marker, Amf0Value};
pub use encode::Amf0Encoder;
pub use error::{Amf0ReadError, Amf0WriteError};
