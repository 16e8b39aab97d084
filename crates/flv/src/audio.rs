use std::io::{self, Read};

use bytes::Bytes;
use byteorder::ReadBytesExt;

/// `AUDIODATA.SoundFormat` (video_file_format_spec_v10.pdf, chapter 1).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundFormat {
    LinearPcmPlatformEndian = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLittleEndian = 3,
    Nellymoser16kHzMono = 4,
    Nellymoser8kHzMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
    Mp38kHz = 14,
    DeviceSpecific = 15,
}

impl TryFrom<u8> for SoundFormat {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0 => Ok(Self::LinearPcmPlatformEndian),
            1 => Ok(Self::Adpcm),
            2 => Ok(Self::Mp3),
            3 => Ok(Self::LinearPcmLittleEndian),
            4 => Ok(Self::Nellymoser16kHzMono),
            5 => Ok(Self::Nellymoser8kHzMono),
            6 => Ok(Self::Nellymoser),
            7 => Ok(Self::G711ALaw),
            8 => Ok(Self::G711MuLaw),
            10 => Ok(Self::Aac),
            11 => Ok(Self::Speex),
            14 => Ok(Self::Mp38kHz),
            15 => Ok(Self::DeviceSpecific),
            other => Err(other),
        }
    }
}

impl SoundFormat {
    /// Whether the core accepts this as a publishable live-audio codec.
    ///
    /// Only AAC and MP3 are forwarded to consumers; everything else is
    /// dropped at ingest.
    pub fn is_supported_for_live(&self) -> bool {
        matches!(self, Self::Aac | Self::Mp3)
    }
}

/// AAC packet type, present as the second byte of an AAC `AUDIODATA` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    SequenceHeader,
    Raw,
}

/// A demuxed `AUDIODATA` payload.
#[derive(Debug, Clone)]
pub struct AudioData {
    pub sound_format: SoundFormat,
    pub aac_packet_type: Option<AacPacketType>,
    pub body: Bytes,
}

impl AudioData {
    /// Demux an `AUDIODATA` payload.
    ///
    /// `forced_format` lets a caller override sound-format detection for
    /// aggregate-tag contexts where the format was already established by a
    /// sibling tag; live ingest always passes `None`.
    pub fn demux(
        reader: &mut std::io::Cursor<Bytes>,
        forced_format: Option<SoundFormat>,
    ) -> io::Result<AudioData> {
        let first_byte = reader.read_u8()?;
        let sound_format = match forced_format {
            Some(f) => f,
            None => SoundFormat::try_from((first_byte >> 4) & 0x0F).map_err(|raw| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown AUDIODATA.SoundFormat: {raw}"),
                )
            })?,
        };

        let aac_packet_type = if sound_format == SoundFormat::Aac {
            let packet_type = reader.read_u8()?;
            Some(if packet_type == 0 {
                AacPacketType::SequenceHeader
            } else {
                AacPacketType::Raw
            })
        } else {
            None
        };

        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;

        Ok(AudioData {
            sound_format,
            aac_packet_type,
            body: Bytes::from(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demuxes_aac_sequence_header() {
        let data = Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]);
        let mut cursor = std::io::Cursor::new(data);
        let parsed = AudioData::demux(&mut cursor, None).unwrap();
        assert_eq!(parsed.sound_format, SoundFormat::Aac);
        assert_eq!(parsed.aac_packet_type, Some(AacPacketType::SequenceHeader));
        assert_eq!(&parsed.body[..], &[0x12, 0x10]);
    }

    #[test]
    fn mp3_has_no_aac_packet_type() {
        let data = Bytes::from_static(&[0x2E, 0x01, 0x02]);
        let mut cursor = std::io::Cursor::new(data);
        let parsed = AudioData::demux(&mut cursor, None).unwrap();
        assert_eq!(parsed.sound_format, SoundFormat::Mp3);
        assert!(parsed.aac_packet_type.is_none());
    }
}
