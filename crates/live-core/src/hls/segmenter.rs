//! The HLS segment/reap/playlist-refresh state machine.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::error::{LiveError, LiveResult};
use crate::frame::Frame;
use crate::hls::encoder::SegmentEncoder;
use crate::hls::hooks::{HlsHook, HlsReapEvent, HookDispatcher};
use crate::hls::key::{HlsKey, encrypt_segment};
use crate::hls::playlist::{build_playlist, write_playlist_atomic};
use crate::window::{FragmentWindow, Segment};

/// If the floor anchor drifts this many fragments from wall-clock, it is
/// re-anchored rather than allowed to accumulate drift.
pub const JUMP_WHEN_PIECE_DEVIATION: i64 = 20;
/// Fraction of one fragment's duration added per unit of floor deviation
/// to the overflow reap threshold.
pub const FLOOR_REAP_PERCENT: f64 = 0.3;
/// Minimum in-progress duration before a reap is even considered — guards
/// against tiny segments forming from a burst of near-simultaneous frames.
pub const MIN_REAP_GUARD_MS: i64 = 200;
/// Minimum *final* duration a reaped segment must have to be published;
/// anything shorter is dropped and its sequence number rolled back.
pub const MIN_SEGMENT_DURATION_MS: i64 = 100;
/// Drop ratio ceiling: a reaped segment whose duration exceeds
/// `3 * max_td` is considered corrupt and dropped rather than published.
const MAX_DURATION_RATIO: i64 = 3;

/// Identity used for path/URI templating and log prefixes.
#[derive(Debug, Clone)]
pub struct PathContext {
    pub vhost: String,
    pub app: String,
    pub stream: String,
    /// Pre-formatted `YYYYMMDD`-style date token, supplied by the caller —
    /// calendar/timezone formatting is an external collaborator's concern.
    pub date_token: String,
    pub hour_token: String,
}

impl PathContext {
    fn expand(&self, template: &str, seq: u64, timestamp_ms: i64) -> String {
        template
            .replace("[vhost]", &self.vhost)
            .replace("[app]", &self.app)
            .replace("[stream]", &self.stream)
            .replace("[seq]", &seq.to_string())
            .replace("[timestamp]", &timestamp_ms.to_string())
            .replace("[date]", &self.date_token)
            .replace("[hour]", &self.hour_token)
    }
}

#[derive(Debug, Clone)]
pub struct HlsSegmenterConfig {
    pub fragment: Duration,
    pub td_ratio: f64,
    pub aof_ratio: f64,
    pub window: Duration,
    pub ts_floor: bool,
    pub cleanup: bool,
    pub wait_keyframe: bool,
    pub keys_enabled: bool,
    pub fragments_per_key: u32,
    pub base_dir: PathBuf,
    pub segment_template: String,
    pub key_template: String,
    pub key_url_template: String,
}

impl HlsSegmenterConfig {
    pub fn max_td(&self) -> Duration {
        self.fragment.mul_f64(self.td_ratio)
    }
}

struct CurrentSegment {
    sequence_no: u64,
    basetime_ms: i64,
    duration_ms: i64,
    is_discontinuity: bool,
    has_written_video: bool,
}

/// Converts one publisher's frame stream into a rolling set of HLS
/// segments and a playlist. Two variants (TS/fMP4) share every line of
/// this state machine and differ only in `encoder` and `init_map_uri`.
pub struct HlsSegmenter {
    config: HlsSegmenterConfig,
    ctx: PathContext,
    encoder: Box<dyn SegmentEncoder>,
    window: FragmentWindow,
    current: Option<CurrentSegment>,
    next_sequence_no: u64,
    pending_discontinuity: bool,

    prev_accept_floor: i64,
    last_deviation: i64,

    active_key: Option<HlsKey>,
    segments_reaped: u64,

    hooks: Option<HookDispatcher>,
    init_map_written: bool,
    cached_video_sh: Option<Bytes>,
    cached_audio_sh: Option<Bytes>,
}

impl HlsSegmenter {
    pub fn new(config: HlsSegmenterConfig, ctx: PathContext, encoder: Box<dyn SegmentEncoder>) -> Self {
        let window = FragmentWindow::new(config.window);
        Self {
            config,
            ctx,
            encoder,
            window,
            current: None,
            next_sequence_no: 0,
            pending_discontinuity: false,
            prev_accept_floor: 0,
            last_deviation: 0,
            active_key: None,
            segments_reaped: 0,
            hooks: None,
            init_map_written: false,
            cached_video_sh: None,
            cached_audio_sh: None,
        }
    }

    pub fn with_hooks(mut self, hook: Arc<dyn HlsHook>) -> Self {
        self.hooks = Some(HookDispatcher::spawn(hook));
        self
    }

    pub fn window(&self) -> &FragmentWindow {
        &self.window
    }

    fn playlist_path(&self) -> PathBuf {
        self.config.base_dir.join("playlist.m3u8")
    }

    fn playlist_uri(&self) -> String {
        "playlist.m3u8".to_string()
    }

    /// A publisher sequence-header change: marks the current segment (or
    /// the next one to open, if none is open) for a discontinuity marker.
    pub fn on_sequence_header_change(&mut self) {
        match &mut self.current {
            Some(seg) => seg.is_discontinuity = true,
            None => self.pending_discontinuity = true,
        }
    }

    /// Feeds a sequence-header frame: caches its raw codec-config payload
    /// (needed for the fMP4 init segment), forwards it to the encoder for
    /// any container-level bookkeeping, and marks the next reaped segment
    /// as a discontinuity.
    pub fn on_sequence_header(&mut self, frame: &Frame) -> LiveResult<()> {
        if frame.is_video {
            self.cached_video_sh = Some(frame.payload.clone());
            self.encoder.set_video_sequence_header(frame)?;
        } else if frame.is_audio {
            self.cached_audio_sh = Some(frame.payload.clone());
            self.encoder.set_audio_sequence_header(frame)?;
        }
        self.on_sequence_header_change();
        Ok(())
    }

    /// Feeds one audio/video frame into the segmenter. `now_ms` is the
    /// caller-supplied wall-clock time, used only by floor-mode anchoring.
    pub fn on_frame(&mut self, frame: &Frame, now_ms: i64) -> LiveResult<()> {
        if frame.is_sequence_header || frame.is_metadata() {
            return Ok(());
        }

        if self.current.is_none() {
            self.open_segment(frame, now_ms)?;
        }

        if let Err(e) = self.encoder.write_sample(frame) {
            error!(error = %e, "hls encoder failed to write sample, reopening segment");
            self.current = None;
            return Err(e);
        }

        if let Some(cur) = &mut self.current {
            cur.duration_ms = cur.duration_ms.max(frame.timestamp_ms - cur.basetime_ms);
            if frame.is_video {
                cur.has_written_video = true;
            }
        }

        if self.should_reap(frame) {
            self.reap()?;
        }

        Ok(())
    }

    fn open_segment(&mut self, frame: &Frame, now_ms: i64) -> LiveResult<()> {
        let fragment_ms = self.config.fragment.as_millis() as i64;

        if self.config.ts_floor && fragment_ms > 0 {
            let now_floor = now_ms / fragment_ms;
            let mut accept_floor = (self.prev_accept_floor + 1).max(now_floor - 1);
            if accept_floor - now_floor > JUMP_WHEN_PIECE_DEVIATION {
                accept_floor = now_floor - 1;
                debug!(accept_floor, now_floor, "hls floor anchor re-anchored");
            }
            self.prev_accept_floor = accept_floor;
            self.last_deviation = accept_floor - now_floor;
        } else {
            self.last_deviation = 0;
        }

        if self.encoder.requires_init_map() && !self.init_map_written {
            let video_sh = self.cached_video_sh.clone();
            let audio_sh = self.cached_audio_sh.clone();
            self.ensure_init_segment(video_sh.as_ref(), audio_sh.as_ref())?;
        }

        let sequence_no = self.next_sequence_no;
        self.next_sequence_no += 1;

        self.encoder.open(frame.timestamp_ms)?;

        self.current = Some(CurrentSegment {
            sequence_no,
            basetime_ms: frame.timestamp_ms,
            duration_ms: 0,
            is_discontinuity: self.pending_discontinuity,
            has_written_video: false,
        });
        self.pending_discontinuity = false;

        Ok(())
    }

    fn floor_deviation_ms(&self) -> f64 {
        if self.config.ts_floor {
            FLOOR_REAP_PERCENT * self.last_deviation as f64 * self.config.fragment.as_millis() as f64
        } else {
            0.0
        }
    }

    fn should_reap(&self, frame: &Frame) -> bool {
        let Some(cur) = &self.current else { return false };
        if cur.duration_ms < MIN_REAP_GUARD_MS {
            return false;
        }

        let max_td_ms = self.config.max_td().as_millis() as f64;
        let floor_dev = self.floor_deviation_ms();

        let overflow = cur.duration_ms as f64 >= max_td_ms + floor_dev;
        if overflow {
            return if self.config.wait_keyframe {
                frame.is_video && frame.is_keyframe
            } else {
                true
            };
        }

        if frame.is_audio {
            let aof_ms = self.config.aof_ratio * self.config.fragment.as_millis() as f64 + floor_dev;
            if cur.duration_ms as f64 >= aof_ms {
                return true;
            }
        }

        false
    }

    /// Finalizes whatever segment is currently open, bypassing the
    /// in-progress-duration guard `should_reap` applies before a reap is
    /// even considered. `reap()`'s own post-finalize floor
    /// (`MIN_SEGMENT_DURATION_MS`) still applies, so a segment this short
    /// is dropped and its sequence number rolled back exactly as a
    /// naturally-triggered reap would be. No-op if nothing is open.
    pub fn force_reap(&mut self) -> LiveResult<()> {
        if self.current.is_some() {
            self.reap()?;
        }
        Ok(())
    }

    fn reap(&mut self) -> LiveResult<()> {
        let cur = self.current.take().expect("reap called with no open segment");

        let body = match self.encoder.finalize() {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "hls segment finalize failed, dropping segment");
                return Err(e);
            }
        };

        let rotate_key = self.config.keys_enabled
            && self.config.fragments_per_key > 0
            && self.segments_reaped % self.config.fragments_per_key as u64 == 0;
        if rotate_key {
            let key = HlsKey::generate(cur.sequence_no);
            if let Err(e) = self.write_key_file(&key) {
                warn!(error = %e, "failed to write hls key file, disabling encryption for this segment");
            } else {
                self.active_key = Some(key);
            }
        }

        let body = if self.config.keys_enabled {
            match &self.active_key {
                Some(key) => encrypt_segment(key, &body).unwrap_or(body),
                None => body,
            }
        } else {
            body
        };

        let ext = self.encoder.file_extension();
        let timestamp_ms = cur.basetime_ms;
        let base_name = self
            .ctx
            .expand(&self.config.segment_template, cur.sequence_no, timestamp_ms);
        let final_name = if base_name.contains("[duration]") {
            base_name.replace("[duration]", &cur.duration_ms.to_string())
        } else {
            base_name
        };
        let final_path = self.config.base_dir.join(format!("{final_name}.{ext}"));
        let tmp_path = self.config.base_dir.join(format!("{final_name}.{ext}.tmp"));

        if let Err(e) = write_file_atomically(&tmp_path, &body) {
            error!(error = %e, "hls segment write failed");
            self.current = None;
            return Err(LiveError::SegmentIo(Arc::new(e)));
        }

        let duration = Duration::from_millis(cur.duration_ms.max(0) as u64);
        let max_td = self.config.max_td();
        let max_allowed = max_td * MAX_DURATION_RATIO as u32;

        if duration < Duration::from_millis(MIN_SEGMENT_DURATION_MS as u64) || duration > max_allowed {
            warn!(
                sequence_no = cur.sequence_no,
                duration_ms = cur.duration_ms,
                "dropping hls segment with out-of-range duration"
            );
            let _ = std::fs::remove_file(&tmp_path);
            self.next_sequence_no -= 1;
            return Ok(());
        }

        if let Err(e) = std::fs::rename(&tmp_path, &final_path) {
            error!(error = %e, "hls segment rename failed");
            let _ = std::fs::remove_file(&tmp_path);
            return Err(LiveError::SegmentIo(Arc::new(e)));
        }

        self.segments_reaped += 1;

        let uri = format!("{final_name}.{ext}");
        let segment = Segment {
            sequence_no: cur.sequence_no,
            path: final_path.clone(),
            uri: uri.clone(),
            key: self.active_key.as_ref().map(|k| (k.key, k.iv)),
            start_ts_ms: cur.basetime_ms,
            end_ts_ms: cur.basetime_ms + cur.duration_ms,
            duration,
            is_discontinuity: cur.is_discontinuity,
        };

        self.window.append(segment);

        if let Some(hooks) = &self.hooks {
            hooks.notify_reap(HlsReapEvent {
                path: final_path,
                uri: uri.clone(),
                playlist_path: self.playlist_path(),
                playlist_uri: self.playlist_uri(),
                sequence_no: cur.sequence_no,
                duration,
            });
        }

        let expired = self.window.shrink();
        FragmentWindow::clear_expired(expired, self.config.cleanup);

        self.rewrite_playlist()?;

        info!(
            sequence_no = cur.sequence_no,
            duration_ms = cur.duration_ms,
            "hls segment reaped"
        );

        Ok(())
    }

    fn write_key_file(&self, key: &HlsKey) -> LiveResult<()> {
        let name = self
            .ctx
            .expand(&self.config.key_template, key.rotated_at_sequence, 0);
        let path = self.config.base_dir.join(name);
        std::fs::write(&path, key.key)?;
        Ok(())
    }

    fn rewrite_playlist(&self) -> LiveResult<()> {
        let init_map_uri = if self.encoder.requires_init_map() {
            Some("init.mp4")
        } else {
            None
        };

        let key_template = self.config.key_url_template.clone();
        let ctx = self.ctx.clone();
        let active_rotation = self.active_key.as_ref().map(|k| k.rotated_at_sequence);
        let active_iv_hex = self.active_key.as_ref().map(HlsKey::iv_hex).unwrap_or_default();

        let playlist = build_playlist(
            &self.window,
            self.encoder.playlist_version(),
            init_map_uri,
            self.config.max_td(),
            move |seq| {
                active_rotation
                    .filter(|&rotated_at| seq == rotated_at)
                    .map(|_| (ctx.expand(&key_template, seq, 0), active_iv_hex.clone()))
            },
        );

        write_playlist_atomic(&self.playlist_path(), &playlist)
    }

    /// Writes the fMP4 `init.mp4` once, if the active encoder requires one
    /// and it has not already been written for this publish session.
    pub fn ensure_init_segment(&mut self, video_config: Option<&bytes::Bytes>, audio_config: Option<&bytes::Bytes>) -> LiveResult<()> {
        if !self.encoder.requires_init_map() || self.init_map_written {
            return Ok(());
        }
        let init = crate::hls::fmp4_encoder::build_init_segment(video_config, audio_config);
        let path = self.config.base_dir.join("init.mp4");
        write_file_atomically(&path, &init)?;
        self.init_map_written = true;
        Ok(())
    }

    /// Flushes any open segment (best-effort) and unlinks the whole
    /// window. Called on source teardown.
    pub fn dispose(&mut self) {
        if let Err(e) = self.force_reap() {
            warn!(error = %e, "failed to flush in-progress hls segment during dispose");
        }
        self.window.dispose();
        self.init_map_written = false;
        self.cached_video_sh = None;
        self.cached_audio_sh = None;
    }
}

fn write_file_atomically(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}
