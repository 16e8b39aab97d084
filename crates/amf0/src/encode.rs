//! AMF0 encoder.
//!
//! Mirrors [`crate::decode::Amf0Decoder`] in reverse: writes [`Amf0Value`]s to
//! any [`std::io::Write`] sink using the big-endian wire representation from
//! amf0_spec_121207.pdf.

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

use super::{Amf0Marker, Amf0Value, Amf0WriteError};

/// An AMF0 encoder writing into a borrowed [`Write`] sink.
pub struct Amf0Encoder;

impl Amf0Encoder {
    /// Encode a single value, writing its marker followed by its payload.
    pub fn encode(writer: &mut impl Write, value: &Amf0Value) -> Result<(), Amf0WriteError> {
        match value {
            Amf0Value::Number(n) => {
                writer.write_u8(Amf0Marker::Number as u8)?;
                writer.write_f64::<BigEndian>(*n)?;
            }
            Amf0Value::Boolean(b) => {
                writer.write_u8(Amf0Marker::Boolean as u8)?;
                writer.write_u8(*b as u8)?;
            }
            Amf0Value::String(s) => {
                writer.write_u8(Amf0Marker::String as u8)?;
                Self::write_short_string(writer, s)?;
            }
            Amf0Value::LongString(s) => {
                writer.write_u8(Amf0Marker::LongString as u8)?;
                writer.write_u32::<BigEndian>(s.len() as u32)?;
                writer.write_all(s.as_bytes())?;
            }
            Amf0Value::Null => writer.write_u8(Amf0Marker::Null as u8)?,
            Amf0Value::Undefined => writer.write_u8(Amf0Marker::Undefined as u8)?,
            Amf0Value::Object(props) => {
                writer.write_u8(Amf0Marker::Object as u8)?;
                Self::write_properties(writer, props)?;
                Self::write_object_end(writer)?;
            }
            Amf0Value::EcmaArray(props) => {
                writer.write_u8(Amf0Marker::EcmaArray as u8)?;
                writer.write_u32::<BigEndian>(props.len() as u32)?;
                Self::write_properties(writer, props)?;
                Self::write_object_end(writer)?;
            }
            Amf0Value::StrictArray(values) => {
                writer.write_u8(Amf0Marker::StrictArray as u8)?;
                writer.write_u32::<BigEndian>(values.len() as u32)?;
                for v in values.iter() {
                    Self::encode(writer, v)?;
                }
            }
            Amf0Value::Date {
                timestamp,
                timezone,
            } => {
                writer.write_u8(Amf0Marker::Date as u8)?;
                writer.write_f64::<BigEndian>(*timestamp)?;
                writer.write_i16::<BigEndian>(*timezone)?;
            }
        }
        Ok(())
    }

    /// Encode a property-list body (object/ecma-array key-value pairs) without
    /// the leading marker, so callers can reuse it for both types.
    fn write_properties(
        writer: &mut impl Write,
        props: &[(std::borrow::Cow<str>, Amf0Value)],
    ) -> Result<(), Amf0WriteError> {
        for (key, val) in props {
            Self::write_short_string(writer, key)?;
            Self::encode(writer, val)?;
        }
        Ok(())
    }

    fn write_short_string(writer: &mut impl Write, s: &str) -> Result<(), Amf0WriteError> {
        if s.len() > u16::MAX as usize {
            return Err(Amf0WriteError::StringTooLong(s.len()));
        }
        writer.write_u16::<BigEndian>(s.len() as u16)?;
        writer.write_all(s.as_bytes())?;
        Ok(())
    }

    fn write_object_end(writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&[0x00, 0x00, Amf0Marker::ObjectEnd as u8])
    }
}
