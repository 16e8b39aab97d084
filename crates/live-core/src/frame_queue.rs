//! Bounded per-consumer FIFO with overflow-driven shrink.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use crate::frame::Frame;

/// Ordered sequence of frames belonging to one consumer.
#[derive(Debug, Default)]
pub struct FrameQueue {
    frames: VecDeque<Arc<Frame>>,
    max_size_ms: i64,
    av_start_time: i64,
    av_end_time: i64,
}

impl FrameQueue {
    pub fn new(max_size_ms: i64) -> Self {
        Self {
            frames: VecDeque::new(),
            max_size_ms,
            av_start_time: 0,
            av_end_time: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Frame>> {
        self.frames.iter()
    }

    pub fn av_end_time(&self) -> i64 {
        self.av_end_time
    }

    /// Span between the first and last A/V timestamp currently queued.
    pub fn duration_ms(&self) -> i64 {
        self.av_end_time - self.av_start_time
    }

    /// Appends `frame`. Returns `true` if the queue overflowed and was
    /// shrunk as a result of this enqueue.
    pub fn enqueue(&mut self, frame: Arc<Frame>) -> bool {
        let counts_for_window = (frame.is_video || frame.is_audio) && frame.timestamp_ms != 0;
        if counts_for_window {
            if self.frames.is_empty() || self.av_start_time == 0 {
                self.av_start_time = frame.timestamp_ms;
            }
            self.av_end_time = frame.timestamp_ms;
        }

        self.frames.push_back(frame);

        let mut overflowed = false;
        while self.av_end_time - self.av_start_time > self.max_size_ms && self.frames.len() > 1 {
            overflowed = true;
            self.shrink();
            // shrink collapses to at most two frames; break once the
            // window condition can no longer be true (it won't recompute
            // larger on its own).
            if self.av_end_time - self.av_start_time <= self.max_size_ms {
                break;
            }
            if self.frames.len() <= 1 {
                break;
            }
        }
        overflowed
    }

    /// Copies up to `max_n` frames from the head into a new `Vec`, advances
    /// `av_start_time` to the last dumped frame's timestamp, and removes the
    /// copied prefix.
    pub fn dump(&mut self, max_n: usize) -> Vec<Arc<Frame>> {
        let n = max_n.min(self.frames.len());
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(f) = self.frames.pop_front() {
                if (f.is_video || f.is_audio) && f.timestamp_ms != 0 {
                    self.av_start_time = f.timestamp_ms;
                }
                out.push(f);
            }
        }
        out
    }

    /// Retains only the most recent audio/video sequence headers, discards
    /// everything else, and stamps both at the current window end.
    pub fn shrink(&mut self) {
        let window_end = self.av_end_time;

        let mut audio_sh: Option<Arc<Frame>> = None;
        let mut video_sh: Option<Arc<Frame>> = None;

        for f in self.frames.drain(..) {
            if f.is_sequence_header {
                if f.is_audio {
                    audio_sh = Some(f);
                } else if f.is_video {
                    video_sh = Some(f);
                }
            }
        }

        if let Some(a) = audio_sh {
            self.frames.push_back(Arc::new(a.with_timestamp(window_end)));
        }
        if let Some(v) = video_sh {
            self.frames.push_back(Arc::new(v.with_timestamp(window_end)));
        }

        self.av_start_time = window_end;
        debug!(
            remaining = self.frames.len(),
            window_end, "frame queue shrunk"
        );
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.av_start_time = 0;
        self.av_end_time = 0;
    }
}
