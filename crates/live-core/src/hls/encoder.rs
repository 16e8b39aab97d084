//! Polymorphic segment encoder seam.
//!
//! The segmenter holds one `Box<dyn SegmentEncoder>` and drives it through
//! `open -> write_sample* -> finalize`, never caring whether the concrete
//! container is MPEG-TS or fMP4.

use bytes::Bytes;

use crate::error::LiveResult;
use crate::frame::Frame;

/// A single encoded sample, ready to append to the segment body.
pub struct EncodedSample {
    pub data: Bytes,
}

pub trait SegmentEncoder: Send {
    /// HLS `EXT-X-VERSION` this encoder's playlist entries require.
    fn playlist_version(&self) -> u64;

    /// Whether the playlist needs an `EXT-X-MAP` entry (fMP4 only).
    fn requires_init_map(&self) -> bool;

    /// Opens a new segment body. Implementations reset any per-segment
    /// state (continuity counters, moof sequence number, ...).
    fn open(&mut self, basetime_ms: i64) -> LiveResult<()>;

    /// Encodes one media frame (audio or video, never a sequence header —
    /// those are consumed via `set_*_sequence_header`) into the current
    /// segment body.
    fn write_sample(&mut self, frame: &Frame) -> LiveResult<()>;

    /// Called whenever the publisher's sequence header changes, so the
    /// encoder can update any cached codec configuration (e.g. the fMP4
    /// init segment, or the TS PMT's stream descriptors).
    fn set_video_sequence_header(&mut self, frame: &Frame) -> LiveResult<()>;
    fn set_audio_sequence_header(&mut self, frame: &Frame) -> LiveResult<()>;

    /// Flushes and returns the finished segment body. The encoder is ready
    /// for the next `open` call afterward.
    fn finalize(&mut self) -> LiveResult<Bytes>;

    /// File extension for this container, without the leading dot.
    fn file_extension(&self) -> &'static str;
}
