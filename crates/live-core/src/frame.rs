//! The media unit that flows from a publisher through the cache, queues and
//! segmenter.

use bytes::Bytes;
use flv::audio::SoundFormat;
use flv::tag::{FlvTag, FlvTagType};
use flv::video::VideoCodecId;

/// Codec carried by a frame's payload, as discovered by format-parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Avc,
    Hevc,
    Aac,
    Mp3,
    /// Parsed but not one of the codecs the live path forwards.
    Unsupported,
    /// Not yet parsed, or not an audio/video tag (e.g. `onMetaData`).
    Unknown,
}

impl CodecKind {
    pub fn from_video_codec_id(id: Option<VideoCodecId>) -> Self {
        match id {
            Some(VideoCodecId::Avc) => CodecKind::Avc,
            Some(VideoCodecId::LegacyHevc) => CodecKind::Hevc,
            Some(_) => CodecKind::Unsupported,
            None => CodecKind::Unknown,
        }
    }

    pub fn from_sound_format(fmt: Option<SoundFormat>) -> Self {
        match fmt {
            Some(SoundFormat::Aac) => CodecKind::Aac,
            Some(SoundFormat::Mp3) => CodecKind::Mp3,
            Some(_) => CodecKind::Unsupported,
            None => CodecKind::Unknown,
        }
    }

    /// Whether the GOP cache accepts video of this codec.
    pub fn gop_cacheable(&self) -> bool {
        matches!(self, CodecKind::Avc | CodecKind::Hevc)
    }
}

/// A single audio or video media unit.
///
/// `timestamp_ms` is the publisher-supplied (possibly jitter-corrected)
/// presentation time. `dts_ms` is derived — for the audio/video formats this
/// core speaks (AAC, AVC, HEVC in byte-stream form) decode order equals
/// presentation order, so `dts_ms` tracks `timestamp_ms` unless a caller
/// explicitly reorders (mix-correct path).
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp_ms: i64,
    pub dts_ms: i64,
    pub codec: CodecKind,
    pub payload: Bytes,
    pub is_video: bool,
    pub is_audio: bool,
    pub is_sequence_header: bool,
    pub is_keyframe: bool,
}

impl Frame {
    /// Builds a `Frame` from a demuxed FLV tag, running format-parsing to
    /// discover the codec.
    pub fn from_flv_tag(tag: &FlvTag) -> Self {
        let is_video = tag.is_video_tag();
        let is_audio = tag.is_audio_tag();
        let is_keyframe = tag.is_key_frame();
        let is_sequence_header = if is_video {
            tag.is_video_sequence_header()
        } else if is_audio {
            tag.is_audio_sequence_header()
        } else {
            false
        };

        let codec = if is_video {
            CodecKind::from_video_codec_id(tag.get_video_codec_id())
        } else if is_audio {
            CodecKind::from_sound_format(tag.get_audio_codec_id())
        } else {
            CodecKind::Unknown
        };

        Frame {
            timestamp_ms: tag.timestamp_ms as i64,
            dts_ms: tag.timestamp_ms as i64,
            codec,
            payload: tag.data.clone(),
            is_video,
            is_audio,
            is_sequence_header,
            is_keyframe,
        }
    }

    /// Whether this frame is a metadata (`onMetaData`) frame: neither audio
    /// nor video.
    pub fn is_metadata(&self) -> bool {
        !self.is_video && !self.is_audio
    }

    /// Clone with a rewritten timestamp (used by jitter correction and by
    /// sequence-header re-stamping on queue shrink).
    pub fn with_timestamp(&self, ts: i64) -> Frame {
        Frame {
            timestamp_ms: ts,
            dts_ms: ts,
            ..self.clone()
        }
    }
}
