//! Publisher/consumer contract: one [`LiveSource`] per published stream,
//! fanning frames out to any number of [`Consumer`] handles plus any
//! registered collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cache::{GopCache, MetadataCache};
use crate::config::{AtcMode, VhostConfig};
use crate::error::{LiveError, LiveResult};
use crate::frame::{CodecKind, Frame};
use crate::frame_queue::FrameQueue;
use crate::jitter::JitterCorrector;
use crate::reorder::MixCorrectBuffer;

/// Per-consumer handle returned by [`LiveSource::create_consumer`].
///
/// Consumers pull frames rather than being pushed to directly: `enqueue`
/// (called by the source's fan-out loop) only appends and wakes; the
/// actual draining happens on the consumer's own task via `dump`/`wait`.
/// Re-check interval for [`Consumer::wait`], matching the RTMP pulse tick
/// a player-side wait loop re-evaluates its own liveness on.
const CONSUMER_WAIT_PULSE: Duration = Duration::from_millis(300);

pub struct Consumer {
    queue: Mutex<FrameQueue>,
    jitter: Mutex<JitterCorrector>,
    notify: Notify,
    id: u64,
    paused: AtomicBool,
    mw_min_msgs: AtomicUsize,
    mw_duration_ms: AtomicI64,
}

impl Consumer {
    fn new(id: u64, queue_length_ms: i64, jitter_mode: crate::config::JitterMode) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(FrameQueue::new(queue_length_ms)),
            jitter: Mutex::new(JitterCorrector::new(jitter_mode)),
            notify: Notify::new(),
            id,
            paused: AtomicBool::new(false),
            mw_min_msgs: AtomicUsize::new(1),
            mw_duration_ms: AtomicI64::new(0),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Called by the source's fan-out path. Applies jitter correction,
    /// enqueues, and wakes any task awaiting new frames. Runs regardless of
    /// the pause flag — a paused consumer still accumulates a bounded
    /// queue, it just stops handing frames to its player on `dump_packets`.
    fn push(&self, frame: &Frame) {
        let corrected_ts = self
            .jitter
            .lock()
            .correct(frame.timestamp_ms, frame.is_metadata());
        let frame = Arc::new(frame.with_timestamp(corrected_ts));

        let overflowed = self.queue.lock().enqueue(frame);
        if overflowed {
            debug!(consumer = self.id, "consumer queue overflowed, shrunk to sequence headers");
        }
        self.notify.notify_waiters();
    }

    /// Toggles the pause flag. While paused, [`Consumer::dump_packets`]
    /// discards rather than delivers, but the underlying queue keeps
    /// accumulating (and shrinking on overflow) exactly as it does when
    /// playing.
    pub fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Sets the min-messages/min-duration thresholds `wait` blocks on.
    pub fn set_wait_thresholds(&self, min_msgs: usize, min_duration_ms: i64) {
        self.mw_min_msgs.store(min_msgs.max(1), Ordering::Relaxed);
        self.mw_duration_ms.store(min_duration_ms, Ordering::Relaxed);
    }

    /// Non-blocking pull: copies up to `max_n` queued frames in submission
    /// order. Returns an empty vec (without draining the queue) while the
    /// consumer is paused.
    pub fn dump_packets(&self, max_n: usize) -> Vec<Arc<Frame>> {
        if self.is_paused() {
            return Vec::new();
        }
        self.queue.lock().dump(max_n)
    }

    /// Blocks until either the queue reaches `mw_min_msgs` messages, spans
    /// at least `mw_duration_ms`, or a pulse tick elapses — whichever comes
    /// first — so the caller can re-check its own liveness flag between
    /// waits rather than relying on a spurious-wake-free notify. Returns
    /// immediately (without consuming anything) if paused, since a paused
    /// consumer has nothing to wait for.
    pub async fn wait(&self) {
        if self.is_paused() {
            return;
        }
        let min_msgs = self.mw_min_msgs.load(Ordering::Relaxed);
        let min_duration_ms = self.mw_duration_ms.load(Ordering::Relaxed);
        loop {
            {
                let q = self.queue.lock();
                if q.len() >= min_msgs || q.duration_ms() >= min_duration_ms {
                    return;
                }
            }
            tokio::select! {
                _ = self.notify.notified() => return,
                _ = tokio::time::sleep(CONSUMER_WAIT_PULSE) => return,
            }
        }
    }

    /// Convenience wrapper used by tests and simple callers: waits for at
    /// least one frame, then dumps up to `max_n`.
    pub async fn recv(&self, max_n: usize) -> Vec<Arc<Frame>> {
        loop {
            let dumped = self.dump_packets(max_n);
            if !dumped.is_empty() || self.is_paused() {
                return dumped;
            }
            self.notify.notified().await;
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }
}

/// A handle an edge-mode source uses to pull frames from an upstream
/// origin instead of accepting a local publisher. Seam only — no
/// transport-specific implementation lives in this crate.
pub trait EdgeOrigin: Send + Sync {
    fn vhost(&self) -> &str;
    fn app(&self) -> &str;
    fn stream(&self) -> &str;
}

/// A collaborator that wants to see every frame published on a source,
/// independent of HLS (DVR, forwarder, exec hooks, ...). Errors are
/// logged and absorbed — a failing collaborator never blocks fan-out to
/// the others or to consumers.
pub trait FrameSink: Send + Sync {
    fn name(&self) -> &'static str;
    fn on_frame(&self, frame: &Frame) -> LiveResult<()>;
    fn on_publish(&self) -> LiveResult<()> {
        Ok(())
    }
    fn on_unpublish(&self) -> LiveResult<()> {
        Ok(())
    }
}

/// Live state for one `vhost/app/stream` triple: caches, consumer
/// registry, and the per-publish-session bookkeeping used for SH-change
/// detection, mix-correct reordering and GOP replay.
pub struct LiveSource {
    pub vhost: String,
    pub app: String,
    pub stream: String,
    config: VhostConfig,

    publishing: Mutex<bool>,
    metadata: Mutex<MetadataCache>,
    gop: Mutex<GopCache>,
    mix_correct: Mutex<Option<MixCorrectBuffer>>,
    consumers: Mutex<Vec<Arc<Consumer>>>,
    sinks: Mutex<Vec<Arc<dyn FrameSink>>>,
    next_consumer_id: AtomicI64,

    atc_active: Mutex<bool>,
    last_activity_ms: AtomicI64,
}

impl LiveSource {
    pub fn new(vhost: impl Into<String>, app: impl Into<String>, stream: impl Into<String>, config: VhostConfig) -> Arc<Self> {
        let mix_correct = config.mix_correct.then(MixCorrectBuffer::new);
        let gop = GopCache::new(config.gop_cache, config.gop_cache_max_frames);
        Arc::new(Self {
            vhost: vhost.into(),
            app: app.into(),
            stream: stream.into(),
            publishing: Mutex::new(false),
            metadata: Mutex::new(MetadataCache::new()),
            gop: Mutex::new(gop),
            mix_correct: Mutex::new(mix_correct),
            consumers: Mutex::new(Vec::new()),
            sinks: Mutex::new(Vec::new()),
            next_consumer_id: AtomicI64::new(0),
            atc_active: Mutex::new(matches!(config.atc, AtcMode::On)),
            last_activity_ms: AtomicI64::new(0),
            config,
        })
    }

    pub fn config(&self) -> &VhostConfig {
        &self.config
    }

    pub fn is_publishing(&self) -> bool {
        *self.publishing.lock()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().len()
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn register_sink(&self, sink: Arc<dyn FrameSink>) {
        self.sinks.lock().push(sink);
    }

    /// Marks the source as actively publishing. Returns
    /// [`LiveError::PublisherConflict`] if a publisher is already bound —
    /// the only caller-visible error this contract ever returns, per the
    /// propagation policy in [`crate::error`].
    pub fn on_publish(&self) -> LiveResult<()> {
        let mut publishing = self.publishing.lock();
        if *publishing {
            return Err(LiveError::PublisherConflict {
                vhost: self.vhost.clone(),
                app: self.app.clone(),
                stream: self.stream.clone(),
            });
        }
        *publishing = true;
        drop(publishing);

        if matches!(self.config.atc, AtcMode::Auto) {
            *self.atc_active.lock() = true;
        }

        for sink in self.sinks.lock().iter() {
            if let Err(e) = sink.on_publish() {
                warn!(collaborator = sink.name(), error = %e, "on_publish collaborator failed");
            }
        }

        info!(vhost = %self.vhost, app = %self.app, stream = %self.stream, "publisher connected");
        Ok(())
    }

    pub fn on_unpublish(&self) {
        *self.publishing.lock() = false;
        self.gop.lock().reset();
        self.metadata.lock().clear();
        if let Some(buf) = self.mix_correct.lock().as_mut() {
            buf.drain_all();
        }

        for sink in self.sinks.lock().iter() {
            if let Err(e) = sink.on_unpublish() {
                warn!(collaborator = sink.name(), error = %e, "on_unpublish collaborator failed");
            }
        }

        info!(vhost = %self.vhost, app = %self.app, stream = %self.stream, "publisher disconnected");
    }

    /// Registers a new consumer and immediately primes it with the cached
    /// sequence headers and GOP, so a late joiner sees a decodable stream
    /// from its very first frame.
    pub fn create_consumer(self: &Arc<Self>) -> Arc<Consumer> {
        let id = self.next_consumer_id.fetch_add(1, Ordering::Relaxed) as u64;
        let consumer = Consumer::new(id, self.config.queue_length.as_millis() as i64, self.config.time_jitter);

        let metadata = self.metadata.lock();
        if let Some(m) = metadata.metadata() {
            consumer.push(m);
        }
        if let Some(a) = metadata.audio_sh() {
            consumer.push(a);
        }
        if let Some(v) = metadata.video_sh() {
            consumer.push(v);
        }
        drop(metadata);

        for frame in self.gop.lock().frames() {
            consumer.push(frame);
        }

        self.consumers.lock().push(consumer.clone());
        debug!(vhost = %self.vhost, stream = %self.stream, consumer = id, "consumer attached");
        consumer
    }

    pub fn remove_consumer(&self, consumer: &Arc<Consumer>) {
        self.consumers.lock().retain(|c| !Arc::ptr_eq(c, consumer));
    }

    /// Accepts one frame from the publisher. Applies SH caching/dedup,
    /// feeds the GOP cache, and fans out to every consumer plus every
    /// registered [`FrameSink`]. When mix-correct is enabled the frame is
    /// first pushed through the reorder buffer and any frames it releases
    /// are fanned out in its place.
    pub fn on_frame(&self, mut frame: Frame) -> LiveResult<()> {
        self.last_activity_ms.store(frame.timestamp_ms, Ordering::Relaxed);

        if frame.is_sequence_header {
            self.handle_sequence_header(&frame);
        }

        if self.config.reduce_sequence_header && frame.is_sequence_header {
            let is_dup = if frame.is_video {
                self.metadata.lock().is_duplicate_vsh(&frame)
            } else {
                self.metadata.lock().is_duplicate_ash(&frame)
            };
            if is_dup {
                return Ok(());
            }
        }

        if frame.is_video && !matches!(frame.codec, CodecKind::Avc | CodecKind::Hevc) {
            debug!(codec = ?frame.codec, "dropping unsupported video codec");
            return Ok(());
        }
        if frame.is_audio && !matches!(frame.codec, CodecKind::Aac | CodecKind::Mp3) {
            debug!(codec = ?frame.codec, "dropping unsupported audio codec");
            return Ok(());
        }

        if frame.is_metadata() {
            frame.dts_ms = frame.timestamp_ms;
            match crate::metadata::sanitize_onmetadata(&frame.payload) {
                Ok(sanitized) => frame.payload = sanitized,
                Err(e) => warn!(error = %e, "onMetaData sanitation failed, forwarding raw payload"),
            }
            if self.metadata.lock().is_duplicate_metadata(&frame) {
                return Ok(());
            }
        }

        if self.config.mix_correct {
            let released = {
                let mut mix_correct = self.mix_correct.lock();
                let buf = mix_correct.as_mut().expect("mix_correct enabled implies buffer present");
                buf.push(Arc::new(frame));
                let mut released = Vec::new();
                while let Some(f) = buf.pop() {
                    released.push(f);
                }
                released
            };
            for f in released {
                self.dispatch(&f);
            }
        } else {
            self.dispatch(&frame);
        }

        Ok(())
    }

    fn handle_sequence_header(&self, frame: &Frame) {
        let mut metadata = self.metadata.lock();
        if frame.is_video {
            metadata.update_vsh(Arc::new(frame.clone()));
        } else if frame.is_audio {
            metadata.update_ash(Arc::new(frame.clone()));
        }
    }

    fn dispatch(&self, frame: &Frame) {
        if !frame.is_sequence_header && !frame.is_metadata() {
            self.gop.lock().cache(Arc::new(frame.clone()));
        } else if frame.is_metadata() {
            self.metadata.lock().update_data(Arc::new(frame.clone()));
        }

        for consumer in self.consumers.lock().iter() {
            consumer.push(frame);
        }

        for sink in self.sinks.lock().iter() {
            if let Err(e) = sink.on_frame(frame) {
                warn!(collaborator = sink.name(), error = %e, "frame sink collaborator failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CodecKind;
    use bytes::Bytes;

    fn video(ts: i64, keyframe: bool, sh: bool) -> Frame {
        Frame {
            timestamp_ms: ts,
            dts_ms: ts,
            codec: CodecKind::Avc,
            payload: Bytes::from_static(&[0, 0, 0, 1]),
            is_video: true,
            is_audio: false,
            is_sequence_header: sh,
            is_keyframe: keyframe,
        }
    }

    #[tokio::test]
    async fn second_publisher_is_rejected_while_first_is_active() {
        let source = LiveSource::new("__defaultVhost__", "live", "s", VhostConfig::default());
        source.on_publish().unwrap();
        let err = source.on_publish().unwrap_err();
        assert!(matches!(err, LiveError::PublisherConflict { .. }));
    }

    #[tokio::test]
    async fn late_joining_consumer_receives_cached_gop_first() {
        let source = LiveSource::new("__defaultVhost__", "live", "s", VhostConfig::default());
        source.on_publish().unwrap();

        source.on_frame(video(0, true, true)).unwrap();
        source.on_frame(video(40, true, false)).unwrap();
        source.on_frame(video(80, false, false)).unwrap();

        let consumer = source.create_consumer();
        let received = consumer.recv(10).await;
        assert!(received.iter().any(|f| f.is_sequence_header));
        assert_eq!(received.last().unwrap().timestamp_ms, 80);
    }

    #[tokio::test]
    async fn unpublish_resets_gop_and_metadata_caches() {
        let source = LiveSource::new("__defaultVhost__", "live", "s", VhostConfig::default());
        source.on_publish().unwrap();
        source.on_frame(video(0, true, true)).unwrap();
        source.on_unpublish();

        let consumer = source.create_consumer();
        assert_eq!(consumer.queue_len(), 0);
    }

    #[tokio::test]
    async fn paused_consumer_discards_dump_packets_but_keeps_accumulating() {
        let source = LiveSource::new("__defaultVhost__", "live", "s", VhostConfig::default());
        source.on_publish().unwrap();
        let consumer = source.create_consumer();

        consumer.pause(true);
        source.on_frame(video(0, true, true)).unwrap();
        source.on_frame(video(40, false, false)).unwrap();

        assert!(consumer.dump_packets(10).is_empty());
        assert_eq!(consumer.queue_len(), 2);

        consumer.pause(false);
        let received = consumer.dump_packets(10);
        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn wait_returns_once_min_msgs_threshold_is_met() {
        let source = LiveSource::new("__defaultVhost__", "live", "s", VhostConfig::default());
        source.on_publish().unwrap();
        let consumer = source.create_consumer();
        consumer.set_wait_thresholds(2, 0);

        let waiter = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.wait().await }
        });

        source.on_frame(video(0, true, true)).unwrap();
        source.on_frame(video(40, false, false)).unwrap();

        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("wait() should return once min_msgs is satisfied")
            .unwrap();
    }
}
