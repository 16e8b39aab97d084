use std::io::{self, Read};

use bytes::Bytes;
use byteorder::{BigEndian, ReadBytesExt};

use crate::resolution::Resolution;

/// Legacy `VideoTagHeader.FrameType` (video_file_format_spec_v10.pdf, chapter 1).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    KeyFrame = 1,
    InterFrame = 2,
    DisposableInterFrame = 3,
    GeneratedKeyFrame = 4,
    Command = 5,
    Unknown = 0,
}

impl From<u8> for VideoFrameType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::KeyFrame,
            2 => Self::InterFrame,
            3 => Self::DisposableInterFrame,
            4 => Self::GeneratedKeyFrame,
            5 => Self::Command,
            _ => Self::Unknown,
        }
    }
}

/// Legacy `VideoTagHeader.CodecID`, extended with the non-standard HEVC id
/// some encoders emit before falling back to the "enhanced" FLV v2 scheme.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecId {
    SorensonH263 = 2,
    ScreenVideo = 3,
    On2Vp6 = 4,
    On2Vp6Alpha = 5,
    ScreenVideoV2 = 6,
    Avc = 7,
    LegacyHevc = 12,
}

impl TryFrom<u8> for VideoCodecId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            2 => Ok(Self::SorensonH263),
            3 => Ok(Self::ScreenVideo),
            4 => Ok(Self::On2Vp6),
            5 => Ok(Self::On2Vp6Alpha),
            6 => Ok(Self::ScreenVideoV2),
            7 => Ok(Self::Avc),
            12 => Ok(Self::LegacyHevc),
            other => Err(other),
        }
    }
}

/// Enhanced-FLV (v2) packet type, carried in the low nibble of the first byte
/// when the high bit of that byte is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedPacketType(pub u8);

impl EnhancedPacketType {
    pub const SEQUENCE_START: Self = Self(0);
    pub const CODED_FRAMES: Self = Self(1);
    pub const SEQUENCE_END: Self = Self(2);
    pub const CODED_FRAMES_X: Self = Self(3);
    pub const METADATA: Self = Self(4);
    pub const MPEG2_TS_SEQUENCE_START: Self = Self(5);
}

/// Either a legacy AVC packet type (0=seq header, 1=NALU, 2=end of sequence)
/// or an enhanced-FLV packet type, depending on the enhanced bit of the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPacketType {
    Legacy(u8),
    Enhanced(EnhancedPacketType),
}

impl VideoPacketType {
    pub fn new(value: u8, enhanced: bool) -> Self {
        if enhanced {
            Self::Enhanced(EnhancedPacketType(value))
        } else {
            Self::Legacy(value)
        }
    }
}

/// Demuxed payload of a video tag, keyed by the codec that produced it.
///
/// Resolution extraction requires a full SPS/sequence-header parse, which is
/// outside this crate's scope; callers that need it should parse `payload`
/// themselves when `codec_id` indicates AVC/HEVC.
#[derive(Debug, Clone)]
pub enum VideoDataBody {
    Avc { resolution: Option<Resolution>, payload: Bytes },
    Hevc { resolution: Option<Resolution>, payload: Bytes },
    Other(Bytes),
}

impl VideoDataBody {
    pub fn get_video_resolution(&self) -> Option<Resolution> {
        match self {
            Self::Avc { resolution, .. } | Self::Hevc { resolution, .. } => *resolution,
            Self::Other(_) => None,
        }
    }
}

/// A demuxed legacy `VIDEODATA` payload.
#[derive(Debug, Clone)]
pub struct VideoData {
    pub frame_type: VideoFrameType,
    pub codec_id: Option<VideoCodecId>,
    pub packet_type: VideoPacketType,
    pub composition_time: i32,
    pub body: VideoDataBody,
}

impl VideoData {
    /// Demux a (non-enhanced) legacy `VIDEODATA` payload.
    ///
    /// Enhanced-FLV payloads (high bit of the first byte set) are not
    /// demuxed here; `FlvTag::is_key_frame`/`is_video_sequence_header` handle
    /// the bits of that format they need directly.
    pub fn demux(reader: &mut std::io::Cursor<Bytes>) -> io::Result<VideoData> {
        let first_byte = reader.read_u8()?;
        let frame_type = VideoFrameType::from((first_byte >> 4) & 0x0F);
        let codec_byte = first_byte & 0x0F;
        let codec_id = VideoCodecId::try_from(codec_byte).ok();

        let (packet_type, composition_time) = match codec_id {
            Some(VideoCodecId::Avc) | Some(VideoCodecId::LegacyHevc) => {
                let packet_type = reader.read_u8()?;
                let composition_time = reader.read_i24::<BigEndian>()?;
                (VideoPacketType::Legacy(packet_type), composition_time)
            }
            _ => (VideoPacketType::Legacy(0), 0),
        };

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        let payload = Bytes::from(payload);

        let body = match codec_id {
            Some(VideoCodecId::Avc) => VideoDataBody::Avc {
                resolution: None,
                payload,
            },
            Some(VideoCodecId::LegacyHevc) => VideoDataBody::Hevc {
                resolution: None,
                payload,
            },
            _ => VideoDataBody::Other(payload),
        };

        Ok(VideoData {
            frame_type,
            codec_id,
            packet_type,
            composition_time,
            body,
        })
    }
}

trait ReadI24 {
    fn read_i24<B: byteorder::ByteOrder>(&mut self) -> io::Result<i32>;
}

impl<R: Read> ReadI24 for R {
    fn read_i24<B: byteorder::ByteOrder>(&mut self) -> io::Result<i32> {
        let u = self.read_u24::<B>()?;
        // Sign-extend the 24-bit two's complement composition time offset.
        Ok(((u << 8) as i32) >> 8)
    }
}
