//! `onMetaData` sanitation.
//!
//! FLV script-data tags carry an AMF0 `String("onMetaData")` followed by
//! an `EcmaArray` of properties. A handful of those properties get rewritten
//! before the tag is fanned out, using the workspace's own `amf0` codec
//! rather than touching the raw bytes by hand.

use amf0::{Amf0Decoder, Amf0Encoder, Amf0Value};
use bytes::Bytes;
use tracing::debug;

use crate::error::{LiveError, LiveResult};

/// Properties dropped entirely: keyframe index/time arrays and
/// file-oriented fields describe a recording, not a live stream, and the
/// encoder's values for them are meaningless here.
const STRIPPED_KEYS: &[&str] = &["keyframes", "filepositions", "times", "duration", "filesize"];

const SERVER_IDENTITY: &str = "live-core";

/// Rewrites the `onMetaData` payload: drops file-oriented properties and
/// stamps a server/version identity before the tag is forwarded.
pub fn sanitize_onmetadata(payload: &[u8]) -> LiveResult<Bytes> {
    let mut decoder = Amf0Decoder::new(payload);
    let (values, err) = decoder.decode_all();
    if let Some(e) = err {
        return Err(LiveError::MalformedSequenceHeader(format!("onMetaData: {e}")));
    }

    let mut iter = values.into_iter();
    let name = iter
        .next()
        .ok_or_else(|| LiveError::MalformedSequenceHeader("onMetaData: empty payload".to_string()))?;

    let props = match iter.next() {
        Some(Amf0Value::Object(p)) | Some(Amf0Value::EcmaArray(p)) => p.into_owned(),
        _ => {
            // Not the shape we expect (e.g. a bare string) — pass through
            // unmodified rather than fail the publish.
            debug!("onMetaData payload has no property list, passing through");
            return Ok(Bytes::copy_from_slice(payload));
        }
    };

    let mut rewritten: Vec<(std::borrow::Cow<str>, Amf0Value)> = Vec::with_capacity(props.len() + 1);
    for (key, value) in props.iter() {
        if STRIPPED_KEYS.contains(&key.as_ref()) {
            continue;
        }
        rewritten.push((key.clone().into_owned().into(), value.into_owned()));
    }
    rewritten.push((
        "server".into(),
        Amf0Value::String(SERVER_IDENTITY.into()),
    ));

    let mut out = Vec::new();
    Amf0Encoder::encode(&mut out, &name.into_owned())
        .map_err(|e| LiveError::MalformedSequenceHeader(format!("onMetaData re-encode: {e}")))?;
    Amf0Encoder::encode(&mut out, &Amf0Value::EcmaArray(rewritten.into()))
        .map_err(|e| LiveError::MalformedSequenceHeader(format!("onMetaData re-encode: {e}")))?;

    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_onmetadata(props: Vec<(&str, Amf0Value)>) -> Vec<u8> {
        let props: Vec<(std::borrow::Cow<str>, Amf0Value)> =
            props.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let mut out = Vec::new();
        Amf0Encoder::encode(&mut out, &Amf0Value::String("onMetaData".into())).unwrap();
        Amf0Encoder::encode(&mut out, &Amf0Value::EcmaArray(props.into())).unwrap();
        out
    }

    #[test]
    fn strips_file_oriented_keys_and_stamps_server_identity() {
        let payload = encode_onmetadata(vec![
            ("duration", Amf0Value::Number(123.4)),
            ("width", Amf0Value::Number(1920.0)),
            ("keyframes", Amf0Value::Object(vec![].into())),
        ]);

        let sanitized = sanitize_onmetadata(&payload).unwrap();
        let mut decoder = Amf0Decoder::new(&sanitized);
        let (values, err) = decoder.decode_all();
        assert!(err.is_none());

        let Amf0Value::EcmaArray(props) = &values[1] else {
            panic!("expected ecma array");
        };
        assert!(!props.iter().any(|(k, _)| k == "keyframes"));
        assert!(!props.iter().any(|(k, _)| k == "duration"));
        let width = props.iter().find(|(k, _)| k == "width").unwrap();
        assert_eq!(width.1, Amf0Value::Number(1920.0));
        let server = props.iter().find(|(k, _)| k == "server").unwrap();
        assert_eq!(server.1, Amf0Value::String("live-core".into()));
    }

    #[test]
    fn malformed_payload_is_reported_as_error() {
        let err = sanitize_onmetadata(&[0xFFu8; 4]).unwrap_err();
        assert!(matches!(err, LiveError::MalformedSequenceHeader(_)));
    }
}
