//! Origin-side orchestration: ties a [`LiveSource`] to its HLS segmenter
//! and any other collaborators registered for a given stream.

use std::sync::Arc;

use tracing::warn;

use crate::error::LiveResult;
use crate::frame::Frame;
use crate::hls::HlsSegmenter;
use crate::source::{FrameSink, LiveSource};

/// Wraps a [`HlsSegmenter`] as a [`FrameSink`] so it can be registered on
/// a [`LiveSource`] like any other collaborator (DVR, forwarder, ...).
/// Segmenter errors are logged and absorbed: a broken HLS pipeline never
/// takes down ingest or other consumers.
pub struct HlsSink {
    segmenter: parking_lot::Mutex<HlsSegmenter>,
}

impl HlsSink {
    pub fn new(segmenter: HlsSegmenter) -> Arc<Self> {
        Arc::new(Self {
            segmenter: parking_lot::Mutex::new(segmenter),
        })
    }
}

impl FrameSink for HlsSink {
    fn name(&self) -> &'static str {
        "hls"
    }

    fn on_frame(&self, frame: &Frame) -> LiveResult<()> {
        if frame.is_sequence_header {
            return self.segmenter.lock().on_sequence_header(frame);
        }
        if frame.is_metadata() {
            return Ok(());
        }
        // `now_ms` floor-mode anchoring uses the frame's own (already
        // jitter-corrected) timestamp as a wall-clock proxy; a true
        // wall-clock reading is an external collaborator's concern this
        // crate does not depend on.
        self.segmenter.lock().on_frame(frame, frame.timestamp_ms)
    }

    fn on_unpublish(&self) -> LiveResult<()> {
        self.segmenter.lock().dispose();
        Ok(())
    }
}

/// Everything hung off one published stream: the source itself plus
/// whichever collaborators (HLS, DVR, forwarder, exec) were registered
/// for it at creation time.
pub struct OriginHub {
    pub source: Arc<LiveSource>,
}

impl OriginHub {
    pub fn new(source: Arc<LiveSource>) -> Self {
        Self { source }
    }

    /// Registers a collaborator. Wraps [`LiveSource::register_sink`] so
    /// call sites don't need to reach into the source directly.
    pub fn add_sink(&self, sink: Arc<dyn FrameSink>) {
        self.source.register_sink(sink);
    }

    pub fn publish(&self) -> LiveResult<()> {
        self.source.on_publish()
    }

    pub fn unpublish(&self) {
        self.source.on_unpublish();
    }

    pub fn push_frame(&self, frame: Frame) {
        if let Err(e) = self.source.on_frame(frame) {
            warn!(vhost = %self.source.vhost, stream = %self.source.stream, error = %e, "hub frame dispatch failed");
        }
    }
}
