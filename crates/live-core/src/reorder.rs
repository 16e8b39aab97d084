//! Mix-correct reorder buffer.
//!
//! An ordered multimap keyed by source timestamp. Frames are released to
//! the caller once the buffer holds a releasable prefix: either at least
//! one audio and one video frame, or ten consecutive frames of a single
//! kind with none of the other.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::frame::Frame;

const SINGLE_KIND_RELEASE_THRESHOLD: usize = 10;

#[derive(Debug, Default)]
pub struct MixCorrectBuffer {
    // Keyed by timestamp; ties broken by insertion order within the bucket.
    buckets: BTreeMap<i64, Vec<Arc<Frame>>>,
    video_count: usize,
    audio_count: usize,
}

impl MixCorrectBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn push(&mut self, frame: Arc<Frame>) {
        if frame.is_video {
            self.video_count += 1;
        } else if frame.is_audio {
            self.audio_count += 1;
        }
        self.buckets.entry(frame.timestamp_ms).or_default().push(frame);
    }

    fn should_release(&self) -> bool {
        if self.video_count > 0 && self.audio_count > 0 {
            return true;
        }
        self.video_count >= SINGLE_KIND_RELEASE_THRESHOLD
            || self.audio_count >= SINGLE_KIND_RELEASE_THRESHOLD
    }

    /// Pops the single oldest frame, if the release condition currently
    /// holds. Call in a loop to drain as many frames as are releasable.
    pub fn pop(&mut self) -> Option<Arc<Frame>> {
        if !self.should_release() {
            return None;
        }

        let &first_ts = self.buckets.keys().next()?;
        let bucket = self.buckets.get_mut(&first_ts)?;
        let frame = bucket.remove(0);
        if bucket.is_empty() {
            self.buckets.remove(&first_ts);
        }

        if frame.is_video {
            self.video_count -= 1;
        } else if frame.is_audio {
            self.audio_count -= 1;
        }
        Some(frame)
    }

    /// Drains every remaining frame in timestamp order, ignoring the release
    /// condition (used on unpublish/flush).
    pub fn drain_all(&mut self) -> Vec<Arc<Frame>> {
        let mut out = Vec::new();
        while let Some((&ts, _)) = self.buckets.iter().next() {
            let bucket = self.buckets.remove(&ts).unwrap();
            out.extend(bucket);
        }
        self.video_count = 0;
        self.audio_count = 0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CodecKind;
    use bytes::Bytes;

    fn frame(ts: i64, is_video: bool) -> Arc<Frame> {
        Arc::new(Frame {
            timestamp_ms: ts,
            dts_ms: ts,
            codec: if is_video { CodecKind::Avc } else { CodecKind::Aac },
            payload: Bytes::new(),
            is_video,
            is_audio: !is_video,
            is_sequence_header: false,
            is_keyframe: false,
        })
    }

    #[test]
    fn releases_once_both_kinds_present() {
        let mut buf = MixCorrectBuffer::new();
        buf.push(frame(100, true));
        assert!(buf.pop().is_none());
        buf.push(frame(80, false));
        let popped = buf.pop().unwrap();
        assert_eq!(popped.timestamp_ms, 80);
        assert!(!popped.is_video);
    }

    #[test]
    fn releases_after_ten_of_one_kind() {
        let mut buf = MixCorrectBuffer::new();
        for i in 0..9 {
            buf.push(frame(i, true));
            assert!(buf.pop().is_none());
        }
        buf.push(frame(9, true));
        assert!(buf.pop().is_some());
    }

    #[test]
    fn pops_in_timestamp_order() {
        let mut buf = MixCorrectBuffer::new();
        buf.push(frame(200, true));
        buf.push(frame(50, false));
        buf.push(frame(120, true));
        let mut out = Vec::new();
        while let Some(f) = buf.pop() {
            out.push(f.timestamp_ms);
        }
        assert_eq!(out, vec![50, 120]);
    }
}
