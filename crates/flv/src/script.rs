use std::io::{self, Read};

use amf0::{Amf0Decoder, Amf0Value};
use bytes::Bytes;

/// A demuxed `SCRIPTDATAOBJECT` (almost always `onMetaData`).
///
/// FLV script tags are a name string followed by a single AMF0 value (object
/// or ECMA array for `onMetaData`); some encoders emit additional trailing
/// values, which are preserved in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptData {
    pub name: String,
    pub value: Amf0Value<'static>,
    pub extra: Vec<Amf0Value<'static>>,
}

impl ScriptData {
    pub fn demux(reader: &mut std::io::Cursor<Bytes>) -> io::Result<ScriptData> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        let mut decoder = Amf0Decoder::new(&buf);
        let name = match decoder.decode() {
            Ok(Amf0Value::String(s)) | Ok(Amf0Value::LongString(s)) => s.into_owned(),
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "script tag name must be an AMF0 string",
                ));
            }
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
        };

        let (mut rest, err) = decoder.decode_all();
        if rest.is_empty() {
            if let Some(e) = err {
                return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
            }
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "script tag has no payload value",
            ));
        }

        let value = rest.remove(0).into_owned();
        let extra = rest.into_iter().map(|v| v.into_owned()).collect();

        Ok(ScriptData { name, value, extra })
    }

    pub fn is_on_metadata(&self) -> bool {
        self.name == "onMetaData" || self.name == "@setDataFrame"
    }
}
