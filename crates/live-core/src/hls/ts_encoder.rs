//! Minimal MPEG-TS segment encoder.
//!
//! This workspace's `ts` crate only ever parses PAT/PMT/PES — there is no
//! muxer to adapt, so this is new code. It follows the same byte-framing
//! conventions that parser uses (188-byte packets, sync byte 0x47, 13-bit
//! PID, PAT/PMT table layout) so the two sides agree on the wire format.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::LiveResult;
use crate::frame::Frame;
use crate::hls::encoder::SegmentEncoder;

const TS_PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;
const PAT_PID: u16 = 0x0000;
const PMT_PID: u16 = 0x1001;
const VIDEO_PID: u16 = 0x0100;
const AUDIO_PID: u16 = 0x0101;
const VIDEO_STREAM_ID: u8 = 0xE0;
const AUDIO_STREAM_ID: u8 = 0xC0;
/// 90kHz clock, matching MPEG-TS PTS/DTS units.
const PTS_CLOCK_HZ: i64 = 90_000;

#[derive(Default)]
struct Continuity {
    pat: u8,
    pmt: u8,
    video: u8,
    audio: u8,
}

pub struct TsEncoder {
    out: BytesMut,
    cc: Continuity,
    has_video: bool,
    has_audio: bool,
    wrote_tables: bool,
}

impl TsEncoder {
    pub fn new() -> Self {
        Self {
            out: BytesMut::new(),
            cc: Continuity::default(),
            has_video: false,
            has_audio: false,
            wrote_tables: false,
        }
    }

    fn next_cc(counter: &mut u8) -> u8 {
        let v = *counter;
        *counter = (*counter + 1) & 0x0F;
        v
    }

    fn write_packet(&mut self, pid: u16, payload_start: bool, cc: u8, payload: &[u8]) {
        let mut packet = [0xFFu8; TS_PACKET_SIZE];
        packet[0] = SYNC_BYTE;
        packet[1] = ((payload_start as u8) << 6) | ((pid >> 8) as u8 & 0x1F);
        packet[2] = (pid & 0xFF) as u8;

        let available = TS_PACKET_SIZE - 4;
        if payload.len() >= available {
            packet[3] = 0x10 | (cc & 0x0F); // payload only
            packet[4..4 + available].copy_from_slice(&payload[..available]);
            self.out.extend_from_slice(&packet);
            if payload.len() > available {
                self.write_continuation(pid, &payload[available..]);
            }
        } else {
            // Stuff with an adaptation field so the packet is exactly 188 bytes.
            let stuffing = available - payload.len();
            packet[3] = 0x30 | (cc & 0x0F); // adaptation field + payload
            let af_len = stuffing - 1;
            packet[4] = af_len as u8;
            if af_len > 0 {
                packet[5] = 0x00;
                for b in packet.iter_mut().take(4 + stuffing).skip(6) {
                    *b = 0xFF;
                }
            }
            packet[4 + stuffing..].copy_from_slice(payload);
            self.out.extend_from_slice(&packet);
        }
    }

    fn write_continuation(&mut self, pid: u16, mut payload: &[u8]) {
        let counter = match pid {
            p if p == VIDEO_PID => &mut self.cc.video,
            p if p == AUDIO_PID => &mut self.cc.audio,
            _ => unreachable!("continuation only used for elementary stream PIDs"),
        };
        let available = TS_PACKET_SIZE - 4;
        while !payload.is_empty() {
            let cc = Self::next_cc(counter);
            let mut packet = [0xFFu8; TS_PACKET_SIZE];
            packet[0] = SYNC_BYTE;
            packet[1] = (pid >> 8) as u8 & 0x1F;
            packet[2] = (pid & 0xFF) as u8;
            let take = payload.len().min(available);
            if take < available {
                let stuffing = available - take;
                packet[3] = 0x30 | (cc & 0x0F);
                let af_len = stuffing - 1;
                packet[4] = af_len as u8;
                packet[4 + stuffing..].copy_from_slice(&payload[..take]);
            } else {
                packet[3] = 0x10 | (cc & 0x0F);
                packet[4..4 + take].copy_from_slice(&payload[..take]);
            }
            self.out.extend_from_slice(&packet);
            payload = &payload[take..];
        }
    }

    fn write_pat(&mut self) {
        let mut section = BytesMut::new();
        section.put_u8(0x00); // table id
        section.put_u16(0xB00D); // section_syntax_indicator=1, reserved, section_length=13
        section.put_u16(0x0001); // transport_stream_id
        section.put_u8(0xC1); // version 0, current_next=1
        section.put_u8(0x00); // section_number
        section.put_u8(0x00); // last_section_number
        section.put_u16(0x0001); // program_number
        section.put_u16(0xE000 | PMT_PID); // reserved bits + PMT PID
        let crc = crc32fast::hash(&section);
        section.put_u32(crc);

        let mut payload = BytesMut::new();
        payload.put_u8(0x00); // pointer field
        payload.extend_from_slice(&section);

        let cc = Self::next_cc(&mut self.cc.pat);
        let payload = payload.freeze();
        self.write_packet(PAT_PID, true, cc, &payload);
    }

    fn write_pmt(&mut self) {
        let stream_type_video = 0x1B; // H.264
        let stream_type_audio = 0x0F; // AAC ADTS

        let mut section = BytesMut::new();
        section.put_u8(0x02); // table id
        // section_length is patched below
        section.put_u16(0); // placeholder
        section.put_u16(0x0001); // program_number
        section.put_u8(0xC1);
        section.put_u8(0x00);
        section.put_u8(0x00);
        section.put_u16(0xE000 | VIDEO_PID); // PCR PID
        section.put_u16(0xF000); // program_info_length = 0

        if self.has_video {
            section.put_u8(stream_type_video);
            section.put_u16(0xE000 | VIDEO_PID);
            section.put_u16(0xF000);
        }
        if self.has_audio {
            section.put_u8(stream_type_audio);
            section.put_u16(0xE000 | AUDIO_PID);
            section.put_u16(0xF000);
        }

        let section_length = section.len() - 3 + 4; // after length field, plus CRC
        let len_bytes = (0xB000u16 | section_length as u16).to_be_bytes();
        section[1] = len_bytes[0];
        section[2] = len_bytes[1];

        let crc = crc32fast::hash(&section);
        section.put_u32(crc);

        let mut payload = BytesMut::new();
        payload.put_u8(0x00);
        payload.extend_from_slice(&section);

        let cc = Self::next_cc(&mut self.cc.pmt);
        let payload = payload.freeze();
        self.write_packet(PMT_PID, true, cc, &payload);
    }

    fn pts_bytes(pts: i64, marker_prefix: u8) -> [u8; 5] {
        let pts = pts as u64 & 0x1_FFFF_FFFF;
        [
            marker_prefix | (((pts >> 30) & 0x07) as u8) << 1 | 1,
            ((pts >> 22) & 0xFF) as u8,
            (((pts >> 15) & 0x7F) as u8) << 1 | 1,
            ((pts >> 7) & 0xFF) as u8,
            ((pts & 0x7F) as u8) << 1 | 1,
        ]
    }

    fn write_pes(&mut self, pid: u16, stream_id: u8, pts_90k: i64, payload: &[u8]) {
        let mut pes = BytesMut::new();
        pes.put_u8(0x00);
        pes.put_u8(0x00);
        pes.put_u8(0x01);
        pes.put_u8(stream_id);
        // PES_packet_length left as 0 (unbounded) when payload is large, as
        // is conventional for video elementary streams in TS.
        let pes_len: usize = 3 + 5 + payload.len();
        if stream_id == AUDIO_STREAM_ID && pes_len <= 0xFFFF {
            pes.put_u16(pes_len as u16);
        } else {
            pes.put_u16(0);
        }
        pes.put_u8(0x80); // marker bits, no scrambling
        pes.put_u8(0x80); // PTS only
        pes.put_u8(5); // PES header data length
        pes.extend_from_slice(&Self::pts_bytes(pts_90k, 0x20));
        pes.extend_from_slice(payload);

        let pid_counter = if pid == VIDEO_PID {
            &mut self.cc.video
        } else {
            &mut self.cc.audio
        };
        let cc = Self::next_cc(pid_counter);
        let pes = pes.freeze();
        self.write_packet(pid, true, cc, &pes);
    }
}

impl Default for TsEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentEncoder for TsEncoder {
    fn playlist_version(&self) -> u64 {
        3
    }

    fn requires_init_map(&self) -> bool {
        false
    }

    fn open(&mut self, _basetime_ms: i64) -> LiveResult<()> {
        self.out.clear();
        self.cc = Continuity::default();
        self.wrote_tables = false;
        Ok(())
    }

    fn write_sample(&mut self, frame: &Frame) -> LiveResult<()> {
        if frame.is_video {
            self.has_video = true;
        } else if frame.is_audio {
            self.has_audio = true;
        }

        if !self.wrote_tables {
            self.write_pat();
            self.write_pmt();
            self.wrote_tables = true;
        }

        let pts_90k = (frame.timestamp_ms as i64 * PTS_CLOCK_HZ) / 1000;
        if frame.is_video {
            self.write_pes(VIDEO_PID, VIDEO_STREAM_ID, pts_90k, &frame.payload);
        } else if frame.is_audio {
            self.write_pes(AUDIO_PID, AUDIO_STREAM_ID, pts_90k, &frame.payload);
        }
        Ok(())
    }

    fn set_video_sequence_header(&mut self, _frame: &Frame) -> LiveResult<()> {
        // AVC/HEVC parameter sets ride inside each IDR's PES payload for
        // the TS variant; nothing to cache at the container level.
        Ok(())
    }

    fn set_audio_sequence_header(&mut self, _frame: &Frame) -> LiveResult<()> {
        Ok(())
    }

    fn finalize(&mut self) -> LiveResult<Bytes> {
        let body = self.out.split().freeze();
        Ok(body)
    }

    fn file_extension(&self) -> &'static str {
        "ts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CodecKind;
    use bytes::Bytes as BytesAlias;

    fn video_frame(ts: i64) -> Frame {
        Frame {
            timestamp_ms: ts,
            dts_ms: ts,
            codec: CodecKind::Avc,
            payload: BytesAlias::from_static(&[0, 0, 0, 1, 0x65]),
            is_video: true,
            is_audio: false,
            is_sequence_header: false,
            is_keyframe: true,
        }
    }

    #[test]
    fn output_is_packet_aligned() {
        let mut enc = TsEncoder::new();
        enc.open(0).unwrap();
        enc.write_sample(&video_frame(0)).unwrap();
        enc.write_sample(&video_frame(40)).unwrap();
        let body = enc.finalize().unwrap();
        assert_eq!(body.len() % TS_PACKET_SIZE, 0);
        assert_eq!(body[0], SYNC_BYTE);
    }

    #[test]
    fn every_packet_starts_with_sync_byte() {
        let mut enc = TsEncoder::new();
        enc.open(0).unwrap();
        let big_payload = vec![0xAB; 2000];
        let frame = Frame {
            payload: Bytes::from(big_payload),
            ..video_frame(0)
        };
        enc.write_sample(&frame).unwrap();
        let body = enc.finalize().unwrap();
        for chunk in body.chunks(TS_PACKET_SIZE) {
            assert_eq!(chunk[0], SYNC_BYTE);
        }
    }
}
