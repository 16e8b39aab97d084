//! Minimal fragmented MP4 (fMP4) segment encoder.
//!
//! Writes plain ISOBMFF box framing (`u32 size | fourcc | body`), nested
//! the way `moof`/`mdat`/`moov` boxes require, without pulling in a general
//! ISOBMFF parser — the encoder only ever emits the fixed box shapes an
//! HLS fMP4 player expects.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::LiveResult;
use crate::frame::Frame;
use crate::hls::encoder::SegmentEncoder;

fn boxed(fourcc: &[u8; 4], body: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(8 + body.len());
    out.put_u32((8 + body.len()) as u32);
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

fn full_box(fourcc: &[u8; 4], version: u8, flags: u32, body: &[u8]) -> BytesMut {
    let mut b = BytesMut::with_capacity(4 + body.len());
    b.put_u8(version);
    b.put_u8((flags >> 16) as u8);
    b.put_u8((flags >> 8) as u8);
    b.put_u8(flags as u8);
    b.extend_from_slice(body);
    boxed(fourcc, &b)
}

const VIDEO_TRACK_ID: u32 = 1;
const AUDIO_TRACK_ID: u32 = 2;
const TIMESCALE: u32 = 1000; // milliseconds, matching `Frame::timestamp_ms`.

/// Builds the one-shot `init.mp4` (ftyp + moov) for a given codec
/// configuration. Sequence headers carry the raw AVCDecoderConfigurationRecord
/// / AudioSpecificConfig payload exactly as FLV delivers them.
pub fn build_init_segment(video_config: Option<&Bytes>, audio_config: Option<&Bytes>) -> Bytes {
    let mut out = BytesMut::new();

    let ftyp_body = {
        let mut b = BytesMut::new();
        b.extend_from_slice(b"isom");
        b.put_u32(512);
        b.extend_from_slice(b"isomiso6mp41");
        b
    };
    out.extend_from_slice(&boxed(b"ftyp", &ftyp_body));

    let mvhd = full_box(
        b"mvhd",
        0,
        0,
        &{
            let mut b = BytesMut::new();
            b.put_u32(0); // creation_time
            b.put_u32(0); // modification_time
            b.put_u32(TIMESCALE);
            b.put_u32(0); // duration: unknown for live fragmented content
            b.put_u32(0x0001_0000); // rate 1.0
            b.put_u16(0x0100); // volume 1.0
            b.put_u16(0); // reserved
            b.put_u64(0); // reserved
            for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                b.put_u32(v);
            }
            for _ in 0..6 {
                b.put_u32(0); // pre_defined
            }
            b.put_u32(0xFFFF_FFFF); // next_track_ID
            b
        },
    );
    let mut moov_body = BytesMut::new();
    moov_body.extend_from_slice(&mvhd);

    if let Some(cfg) = video_config {
        moov_body.extend_from_slice(&video_trak(cfg));
    }
    if let Some(cfg) = audio_config {
        moov_body.extend_from_slice(&audio_trak(cfg));
    }

    let mut trex_entries = BytesMut::new();
    if video_config.is_some() {
        trex_entries.extend_from_slice(&trex(VIDEO_TRACK_ID));
    }
    if audio_config.is_some() {
        trex_entries.extend_from_slice(&trex(AUDIO_TRACK_ID));
    }
    moov_body.extend_from_slice(&boxed(b"mvex", &trex_entries));

    out.extend_from_slice(&boxed(b"moov", &moov_body));
    out.freeze()
}

fn trex(track_id: u32) -> BytesMut {
    full_box(
        b"trex",
        0,
        0,
        &{
            let mut b = BytesMut::new();
            b.put_u32(track_id);
            b.put_u32(1); // default_sample_description_index
            b.put_u32(0); // default_sample_duration
            b.put_u32(0); // default_sample_size
            b.put_u32(0); // default_sample_flags
            b
        },
    )
}

fn video_trak(avc_config: &Bytes) -> BytesMut {
    let stsd = {
        let avc1 = {
            let mut body = BytesMut::new();
            body.put_bytes(0, 6); // reserved
            body.put_u16(1); // data_reference_index
            body.put_bytes(0, 16); // pre_defined + reserved
            body.put_u16(0); // width (unknown at config time)
            body.put_u16(0); // height
            body.put_u32(0x0048_0000); // horizresolution 72dpi
            body.put_u32(0x0048_0000); // vertresolution
            body.put_u32(0); // reserved
            body.put_u16(1); // frame_count
            body.put_bytes(0, 32); // compressorname
            body.put_u16(0x0018); // depth
            body.put_i16(-1); // pre_defined
            body.extend_from_slice(&boxed(b"avcC", avc_config));
            boxed(b"avc1", &body)
        };
        full_box(
            b"stsd",
            0,
            0,
            &{
                let mut b = BytesMut::new();
                b.put_u32(1);
                b.extend_from_slice(&avc1);
                b
            },
        )
    };
    trak(VIDEO_TRACK_ID, b"vide", &stsd)
}

fn audio_trak(aac_config: &Bytes) -> BytesMut {
    let stsd = {
        let mp4a = {
            let mut body = BytesMut::new();
            body.put_bytes(0, 6);
            body.put_u16(1); // data_reference_index
            body.put_u64(0); // reserved
            body.put_u16(2); // channelcount (assume stereo)
            body.put_u16(16); // samplesize
            body.put_u32(0); // pre_defined + reserved
            body.put_u32(44_100 << 16); // samplerate, fixed-point
            body.extend_from_slice(&esds(aac_config));
            boxed(b"mp4a", &body)
        };
        full_box(
            b"stsd",
            0,
            0,
            &{
                let mut b = BytesMut::new();
                b.put_u32(1);
                b.extend_from_slice(&mp4a);
                b
            },
        )
    };
    trak(AUDIO_TRACK_ID, b"soun", &stsd)
}

fn esds(asc: &Bytes) -> BytesMut {
    let mut desc = BytesMut::new();
    desc.put_u8(0x03); // ES_DescrTag
    desc.put_u8((3 + 5 + asc.len() + 2) as u8);
    desc.put_u16(0); // ES_ID
    desc.put_u8(0); // flags

    desc.put_u8(0x04); // DecoderConfigDescrTag
    desc.put_u8((13 + asc.len()) as u8);
    desc.put_u8(0x40); // objectTypeIndication: Audio ISO/IEC 14496-3
    desc.put_u8(0x15); // streamType audio, upStream=0, reserved=1
    desc.put_u8(0);
    desc.put_u16(0); // bufferSizeDB (24 bits total, simplified)
    desc.put_u32(0); // maxBitrate
    desc.put_u32(0); // avgBitrate

    desc.put_u8(0x05); // DecSpecificInfoTag
    desc.put_u8(asc.len() as u8);
    desc.extend_from_slice(asc);

    desc.put_u8(0x06); // SLConfigDescrTag
    desc.put_u8(1);
    desc.put_u8(0x02);

    full_box(b"esds", 0, 0, &desc)
}

fn trak(track_id: u32, handler: &[u8; 4], stsd: &BytesMut) -> BytesMut {
    let tkhd = full_box(
        b"tkhd",
        0,
        0x0000_0003, // track enabled + in movie
        &{
            let mut b = BytesMut::new();
            b.put_u32(0);
            b.put_u32(0);
            b.put_u32(track_id);
            b.put_u32(0);
            b.put_u32(0); // duration
            b.put_u64(0);
            b.put_u16(0);
            b.put_u16(0);
            b.put_i16(0);
            b.put_u16(0);
            for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
                b.put_u32(v);
            }
            b.put_u32(0); // width
            b.put_u32(0); // height
            b
        },
    );

    let mdhd = full_box(
        b"mdhd",
        0,
        0,
        &{
            let mut b = BytesMut::new();
            b.put_u32(0);
            b.put_u32(0);
            b.put_u32(TIMESCALE);
            b.put_u32(0);
            b.put_u16(0x55C4); // language "und"
            b.put_u16(0);
            b
        },
    );

    let hdlr = full_box(
        b"hdlr",
        0,
        0,
        &{
            let mut b = BytesMut::new();
            b.put_u32(0);
            b.extend_from_slice(handler);
            b.put_bytes(0, 12);
            b.extend_from_slice(b"live-core\0");
            b
        },
    );

    let stbl = {
        let mut b = BytesMut::new();
        b.extend_from_slice(stsd);
        b.extend_from_slice(&full_box(b"stts", 0, 0, &0u32.to_be_bytes()));
        b.extend_from_slice(&full_box(b"stsc", 0, 0, &0u32.to_be_bytes()));
        b.extend_from_slice(&full_box(b"stsz", 0, 0, &{
            let mut s = BytesMut::new();
            s.put_u32(0);
            s.put_u32(0);
            s
        }));
        b.extend_from_slice(&full_box(b"stco", 0, 0, &0u32.to_be_bytes()));
        boxed(b"stbl", &b)
    };

    let minf = {
        let mut b = BytesMut::new();
        if handler == b"vide" {
            b.extend_from_slice(&full_box(b"vmhd", 0, 1, &[0u8; 8]));
        } else {
            b.extend_from_slice(&full_box(b"smhd", 0, 0, &[0u8; 4]));
        }
        b.extend_from_slice(&boxed(b"dinf", &{
            let url = full_box(b"url ", 0, 1, &[]);
            let dref = full_box(
                b"dref",
                0,
                0,
                &{
                    let mut d = BytesMut::new();
                    d.put_u32(1);
                    d.extend_from_slice(&url);
                    d
                },
            );
            dref
        }));
        b.extend_from_slice(&stbl);
        boxed(b"minf", &b)
    };

    let mdia = {
        let mut b = BytesMut::new();
        b.extend_from_slice(&mdhd);
        b.extend_from_slice(&hdlr);
        b.extend_from_slice(&minf);
        boxed(b"mdia", &b)
    };

    let mut b = BytesMut::new();
    b.extend_from_slice(&tkhd);
    b.extend_from_slice(&mdia);
    boxed(b"trak", &b)
}

struct SampleMeta {
    size: u32,
    duration: u32,
    is_key: bool,
}

pub struct Fmp4Encoder {
    track_id: u32,
    samples: Vec<SampleMeta>,
    mdat_body: BytesMut,
    sequence_number: u32,
    last_ts_ms: Option<i64>,
}

impl Fmp4Encoder {
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            samples: Vec::new(),
            mdat_body: BytesMut::new(),
            sequence_number: 0,
            last_ts_ms: None,
        }
    }
}

impl Default for Fmp4Encoder {
    fn default() -> Self {
        Self::new(VIDEO_TRACK_ID)
    }
}

impl SegmentEncoder for Fmp4Encoder {
    fn playlist_version(&self) -> u64 {
        7
    }

    fn requires_init_map(&self) -> bool {
        true
    }

    fn open(&mut self, basetime_ms: i64) -> LiveResult<()> {
        self.samples.clear();
        self.mdat_body.clear();
        self.sequence_number += 1;
        self.last_ts_ms = Some(basetime_ms);
        Ok(())
    }

    fn write_sample(&mut self, frame: &Frame) -> LiveResult<()> {
        let prev = self.last_ts_ms.replace(frame.timestamp_ms).unwrap_or(frame.timestamp_ms);
        let duration = (frame.timestamp_ms - prev).clamp(0, i64::from(u32::MAX)) as u32;
        self.samples.push(SampleMeta {
            size: frame.payload.len() as u32,
            duration,
            is_key: frame.is_keyframe,
        });
        self.mdat_body.extend_from_slice(&frame.payload);
        Ok(())
    }

    fn set_video_sequence_header(&mut self, _frame: &Frame) -> LiveResult<()> {
        // The segmenter caches the raw config payload itself and passes it
        // to `build_init_segment` directly; nothing to track per-fragment.
        Ok(())
    }

    fn set_audio_sequence_header(&mut self, _frame: &Frame) -> LiveResult<()> {
        Ok(())
    }

    fn finalize(&mut self) -> LiveResult<Bytes> {
        let mut trun_body = BytesMut::new();
        trun_body.put_u32(self.samples.len() as u32);
        // data_offset patched below once moof's size is known.
        trun_body.put_i32(0);
        for s in &self.samples {
            trun_body.put_u32(s.duration);
            trun_body.put_u32(s.size);
            trun_body.put_u32(if s.is_key { 0x0200_0000 } else { 0x0101_0000 });
        }
        // flags: data-offset-present | duration-present | size-present | flags-present.
        // No composition-time-offset field is written per sample, so that bit
        // (0x800) must stay clear or a reader would misalign every sample.
        let trun = full_box(b"trun", 0, 0x0000_0701, &trun_body);

        let tfhd = full_box(
            b"tfhd",
            0,
            0x0002_0000, // default-base-is-moof
            &self.track_id.to_be_bytes(),
        );

        let tfdt = full_box(b"tfdt", 1, 0, &{
            let mut b = BytesMut::new();
            b.put_u64(self.last_ts_ms.unwrap_or(0).max(0) as u64);
            b
        });

        let mut traf_body = BytesMut::new();
        traf_body.extend_from_slice(&tfhd);
        traf_body.extend_from_slice(&tfdt);
        traf_body.extend_from_slice(&trun);
        let traf = boxed(b"traf", &traf_body);

        let mfhd = full_box(b"mfhd", 0, 0, &self.sequence_number.to_be_bytes());

        let mut moof_body = BytesMut::new();
        moof_body.extend_from_slice(&mfhd);
        moof_body.extend_from_slice(&traf);
        let moof = boxed(b"moof", &moof_body);

        // Patch trun's data_offset now that moof's total size is known:
        // data starts right after moof + mdat's 8-byte header.
        let mut moof = moof;
        let data_offset = moof.len() as i32 + 8;
        patch_trun_data_offset(&mut moof, data_offset);

        let mdat = boxed(b"mdat", &self.mdat_body);

        let mut out = BytesMut::with_capacity(moof.len() + mdat.len());
        out.extend_from_slice(&moof);
        out.extend_from_slice(&mdat);

        self.samples.clear();
        self.mdat_body.clear();
        Ok(out.freeze())
    }

    fn file_extension(&self) -> &'static str {
        "m4s"
    }
}

/// Byte distance from the start of a box's fourcc (as returned by
/// [`find_fourcc`], which points at `trun` itself, not the preceding 4-byte
/// box size) to its `data_offset` field: past the fourcc (4), the full-box
/// version/flags (4), and `sample_count` (4) — `4 + 4 + 4 = 12`.
fn trun_data_offset_from_fourcc() -> usize {
    12
}

/// Finds the last `trun` box in `moof` and overwrites its `data_offset`
/// field. `moof` contains exactly one `traf`/`trun` in this encoder, so a
/// linear scan for the fourcc is unambiguous.
fn patch_trun_data_offset(moof: &mut BytesMut, data_offset: i32) {
    if let Some(pos) = find_fourcc(moof, b"trun") {
        let offset_field = pos + trun_data_offset_from_fourcc();
        moof[offset_field..offset_field + 4].copy_from_slice(&data_offset.to_be_bytes());
    }
}

fn find_fourcc(data: &[u8], fourcc: &[u8; 4]) -> Option<usize> {
    data.windows(4).position(|w| w == fourcc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CodecKind;

    #[test]
    fn init_segment_starts_with_ftyp() {
        let cfg = Bytes::from_static(&[0x01, 0x64, 0x00, 0x1F]);
        let init = build_init_segment(Some(&cfg), None);
        assert_eq!(&init[4..8], b"ftyp");
    }

    #[test]
    fn moof_mdat_round_trip_sizes() {
        let mut enc = Fmp4Encoder::new(VIDEO_TRACK_ID);
        enc.open(0).unwrap();
        let frame = Frame {
            timestamp_ms: 0,
            dts_ms: 0,
            codec: CodecKind::Avc,
            payload: Bytes::from_static(&[1, 2, 3, 4]),
            is_video: true,
            is_audio: false,
            is_sequence_header: false,
            is_keyframe: true,
        };
        enc.write_sample(&frame).unwrap();
        let body = enc.finalize().unwrap();
        assert_eq!(&body[4..8], b"moof");
        let moof_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;
        assert_eq!(&body[moof_len + 4..moof_len + 8], b"mdat");
    }

    #[test]
    fn trun_data_offset_points_past_moof_into_mdat() {
        let mut enc = Fmp4Encoder::new(VIDEO_TRACK_ID);
        enc.open(0).unwrap();
        let frame = Frame {
            timestamp_ms: 0,
            dts_ms: 0,
            codec: CodecKind::Avc,
            payload: Bytes::from_static(&[1, 2, 3, 4]),
            is_video: true,
            is_audio: false,
            is_sequence_header: false,
            is_keyframe: true,
        };
        enc.write_sample(&frame).unwrap();
        let body = enc.finalize().unwrap();
        let moof_len = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) as usize;

        let trun_pos = find_fourcc(&body[..moof_len], b"trun").expect("trun present");
        let offset_field = trun_pos + trun_data_offset_from_fourcc();
        let data_offset = i32::from_be_bytes([
            body[offset_field],
            body[offset_field + 1],
            body[offset_field + 2],
            body[offset_field + 3],
        ]);

        // data_offset is relative to the start of the moof box and must
        // land exactly on mdat's first payload byte (past its 8-byte
        // header), never inside sample_count or left at the placeholder 0.
        assert_eq!(data_offset, moof_len as i32 + 8);
    }
}
