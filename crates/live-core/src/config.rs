//! Per-vhost configuration surface.
//!
//! This is a plain value type, not a file-format parser — parsing vhost
//! config from disk/CLI is an external collaborator's job; the core only
//! needs the resolved values.

use std::time::Duration;

/// Timestamp-correction strategy applied before a frame is enqueued to a
/// consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JitterMode {
    #[default]
    Off,
    Zero,
    Full,
}

/// Which segment container the HLS segmenter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HlsVariant {
    #[default]
    Ts,
    Fmp4,
}

/// Absolute-time continuation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtcMode {
    #[default]
    Off,
    On,
    /// `atc_auto`: enable ATC automatically once a republish is observed.
    Auto,
}

#[derive(Debug, Clone)]
pub struct HlsKeyConfig {
    pub enabled: bool,
    /// Rotate a fresh key every N segments.
    pub fragments_per_key: u32,
    /// Filename template for the key file, e.g. `"[seq].key"`.
    pub key_file_template: String,
    pub key_file_path: String,
    /// URL template embedded in the playlist's `EXT-X-KEY` URI.
    pub key_url_template: String,
}

impl Default for HlsKeyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fragments_per_key: 5,
            key_file_template: "[seq].key".to_string(),
            key_file_path: String::new(),
            key_url_template: "[seq].key".to_string(),
        }
    }
}

/// Resolved per-vhost configuration.
#[derive(Debug, Clone)]
pub struct VhostConfig {
    pub hls_fragment: Duration,
    pub hls_td_ratio: f64,
    pub hls_aof_ratio: f64,
    pub hls_window: Duration,
    pub hls_ts_floor: bool,
    pub hls_cleanup: bool,
    pub hls_wait_keyframe: bool,
    pub hls_keys: HlsKeyConfig,
    pub hls_dispose: Duration,
    pub hls_use_fmp4: bool,
    pub hls_path: String,
    pub hls_fragment_template: String,

    pub gop_cache: bool,
    pub gop_cache_max_frames: usize,

    pub queue_length: Duration,

    pub time_jitter: JitterMode,
    pub mix_correct: bool,
    pub atc: AtcMode,

    pub reduce_sequence_header: bool,
    pub parse_sps: bool,
}

impl Default for VhostConfig {
    fn default() -> Self {
        Self {
            hls_fragment: Duration::from_secs(10),
            hls_td_ratio: 1.5,
            hls_aof_ratio: 2.0,
            hls_window: Duration::from_secs(60),
            hls_ts_floor: false,
            hls_cleanup: true,
            hls_wait_keyframe: true,
            hls_keys: HlsKeyConfig::default(),
            hls_dispose: Duration::ZERO,
            hls_use_fmp4: false,
            hls_path: "./objs/nginx/html".to_string(),
            hls_fragment_template: "[stream]-[seq].ts".to_string(),

            gop_cache: true,
            gop_cache_max_frames: 0,

            queue_length: Duration::from_secs(10),

            time_jitter: JitterMode::default(),
            mix_correct: false,
            atc: AtcMode::default(),

            reduce_sequence_header: false,
            parse_sps: true,
        }
    }
}

impl VhostConfig {
    /// Effective grace delay before a source with no publisher/consumers is
    /// torn down (`max(3s, hls.cleanup_delay)`).
    pub fn stream_dispose_delay(&self) -> Duration {
        self.hls_dispose.max(Duration::from_secs(3))
    }

    pub fn max_td(&self) -> Duration {
        self.hls_fragment.mul_f64(self.hls_td_ratio)
    }
}
