//! Per-stream timestamp normalization.
//!
//! The corrector never reorders frames — it only rewrites timestamps so
//! that, for a given consumer, they are weakly monotone.

use crate::config::JitterMode;

const DEFAULT_CLAMP_MAX_MS: i64 = 90_000;
const FULL_CLAMP_MAX_MS: i64 = 250;
const FULL_DEFAULT_DELTA_MS: i64 = 10;

/// Running jitter-correction state for one consumer/stream.
#[derive(Debug, Clone, Copy)]
pub struct JitterCorrector {
    mode: JitterMode,
    delta: i64,
    previous_ts: i64,
    pts: i64,
    /// First timestamp seen, used by [`JitterMode::Zero`].
    first_ts: Option<i64>,
    initialized: bool,
}

impl JitterCorrector {
    pub fn new(mode: JitterMode) -> Self {
        Self {
            mode,
            delta: 0,
            previous_ts: 0,
            pts: 0,
            first_ts: None,
            initialized: false,
        }
    }

    pub fn mode(&self) -> JitterMode {
        self.mode
    }

    /// Corrects one frame's timestamp. `is_metadata` forces ts=0 under
    /// [`JitterMode::Full`].
    pub fn correct(&mut self, ts: i64, is_metadata: bool) -> i64 {
        match self.mode {
            JitterMode::Off => ts,
            JitterMode::Zero => {
                let first = *self.first_ts.get_or_insert(ts);
                (ts - first).max(0)
            }
            JitterMode::Full => {
                if is_metadata {
                    return 0;
                }
                self.step(ts, FULL_CLAMP_MAX_MS, FULL_DEFAULT_DELTA_MS)
            }
        }
    }

    fn step(&mut self, t: i64, clamp_max: i64, jitter_default: i64) -> i64 {
        if !self.initialized {
            self.initialized = true;
            self.previous_ts = t;
            self.pts = t;
            self.delta = 0;
            return self.pts;
        }

        let raw = t - self.previous_ts;
        self.delta = if t < self.previous_ts || raw > clamp_max {
            // Reset: either the stream went backwards, or the gap is large
            // enough to be a discontinuity rather than normal jitter.
            if clamp_max == FULL_CLAMP_MAX_MS && raw.abs() > 0 {
                jitter_default
            } else {
                0
            }
        } else {
            raw.clamp(0, clamp_max)
        };

        self.previous_ts = t;
        self.pts += self.delta;
        self.pts
    }
}

impl Default for JitterCorrector {
    fn default() -> Self {
        Self::new(JitterMode::default())
    }
}

/// Standalone helper implementing the default-mode jitter algorithm, usable
/// without constructing a full [`JitterCorrector`] (e.g. for tests asserting
/// the exact clamp formula).
pub fn clamp_delta(t: i64, previous_ts: i64) -> i64 {
    if t < previous_ts {
        return 0;
    }
    let raw = t - previous_ts;
    if raw > DEFAULT_CLAMP_MAX_MS { 0 } else { raw }
}
