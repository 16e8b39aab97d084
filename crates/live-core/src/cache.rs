//! Metadata cache and GOP (group-of-pictures) cache.

use std::sync::Arc;

use tracing::debug;

use crate::frame::Frame;

/// Holds the latest on-metadata frame and audio/video sequence headers,
/// plus a "previous" snapshot of each sequence header used to detect
/// duplicates.
#[derive(Debug, Default, Clone)]
pub struct MetadataCache {
    metadata: Option<Arc<Frame>>,
    audio_sh: Option<Arc<Frame>>,
    audio_sh_previous: Option<Arc<Frame>>,
    video_sh: Option<Arc<Frame>>,
    video_sh_previous: Option<Arc<Frame>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> Option<&Arc<Frame>> {
        self.metadata.as_ref()
    }

    pub fn audio_sh(&self) -> Option<&Arc<Frame>> {
        self.audio_sh.as_ref()
    }

    pub fn video_sh(&self) -> Option<&Arc<Frame>> {
        self.video_sh.as_ref()
    }

    pub fn update_data(&mut self, frame: Arc<Frame>) {
        self.metadata = Some(frame);
    }

    /// Whether `candidate`'s (already-sanitized) payload is identical to
    /// the currently cached `onMetaData` tag, used to suppress redundant
    /// metadata fan-out.
    pub fn is_duplicate_metadata(&self, candidate: &Frame) -> bool {
        self.metadata
            .as_ref()
            .is_some_and(|prev| prev.payload == candidate.payload)
    }

    pub fn update_ash(&mut self, frame: Arc<Frame>) {
        self.audio_sh_previous = self.audio_sh.take();
        self.audio_sh = Some(frame);
    }

    pub fn update_vsh(&mut self, frame: Arc<Frame>) {
        self.video_sh_previous = self.video_sh.take();
        self.video_sh = Some(frame);
    }

    /// Whether `candidate` carries the identical payload to the previous
    /// audio sequence header (used to suppress duplicate-SH fan-out when
    /// `reduce_sequence_header` is enabled).
    pub fn is_duplicate_ash(&self, candidate: &Frame) -> bool {
        self.audio_sh_previous
            .as_ref()
            .is_some_and(|prev| prev.payload == candidate.payload)
    }

    pub fn is_duplicate_vsh(&self, candidate: &Frame) -> bool {
        self.video_sh_previous
            .as_ref()
            .is_some_and(|prev| prev.payload == candidate.payload)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Number of consecutive audio frames (with no intervening video) after
/// which the stream is treated as having become pure-audio and the GOP
/// cache is cleared.
const PURE_AUDIO_CLEAR_THRESHOLD: u32 = 115;

/// Ordered sequence of frames from the most recent keyframe forward.
#[derive(Debug, Default)]
pub struct GopCache {
    enabled: bool,
    max_frames: usize,
    frames: Vec<Arc<Frame>>,
    video_count: u32,
    audio_after_last_video: u32,
    has_seen_video: bool,
}

impl GopCache {
    pub fn new(enabled: bool, max_frames: usize) -> Self {
        Self {
            enabled,
            max_frames,
            frames: Vec::new(),
            video_count: 0,
            audio_after_last_video: 0,
            has_seen_video: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Arc<Frame>] {
        &self.frames
    }

    fn clear(&mut self) {
        self.frames.clear();
        self.video_count = 0;
    }

    /// Implements the GOP caching algorithm. `frame` must not be
    /// a sequence header — the caller filters those out beforehand.
    pub fn cache(&mut self, frame: Arc<Frame>) {
        if !self.enabled {
            return;
        }

        if frame.is_video && !frame.codec.gop_cacheable() {
            return;
        }

        if frame.is_video {
            self.video_count += 1;
            self.audio_after_last_video = 0;
            self.has_seen_video = true;
        }

        if !self.has_seen_video {
            // Pure-audio streams are allowed, but only once we know no
            // video is coming; until then we don't cache anything so a
            // late-arriving keyframe always restarts the cache clean.
            return;
        }

        if frame.is_audio {
            self.audio_after_last_video += 1;
            if self.audio_after_last_video > PURE_AUDIO_CLEAR_THRESHOLD {
                debug!("gop cache: stream became pure-audio, clearing");
                self.clear();
                self.has_seen_video = false;
                return;
            }
        }

        if frame.is_video && frame.is_keyframe {
            self.clear();
            self.video_count = 1;
        }

        self.frames.push(frame);

        if self.max_frames > 0 && self.frames.len() > self.max_frames {
            self.clear();
        }
    }

    /// Resets all state (publish session ended).
    pub fn reset(&mut self) {
        self.frames.clear();
        self.video_count = 0;
        self.audio_after_last_video = 0;
        self.has_seen_video = false;
    }
}
