//! Sliding ordered collection of finalized HLS segments.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, warn};

/// A single finalized HLS fragment.
#[derive(Debug, Clone)]
pub struct Segment {
    pub sequence_no: u64,
    pub path: PathBuf,
    pub uri: String,
    pub key: Option<([u8; 16], [u8; 16])>,
    pub start_ts_ms: i64,
    pub end_ts_ms: i64,
    pub duration: Duration,
    pub is_discontinuity: bool,
}

impl Segment {
    pub fn duration_ms(&self) -> i64 {
        self.duration.as_millis() as i64
    }
}

/// Ordered collection of live [`Segment`]s, bounded by a duration window.
#[derive(Debug, Default)]
pub struct FragmentWindow {
    segments: Vec<Segment>,
    window: Duration,
}

impl FragmentWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            segments: Vec::new(),
            window,
        }
    }

    pub fn append(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn size(&self) -> usize {
        self.segments.len()
    }

    pub fn empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first(&self) -> Option<&Segment> {
        self.segments.first()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn at(&self, i: usize) -> Option<&Segment> {
        self.segments.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn max_duration(&self) -> Duration {
        self.segments
            .iter()
            .map(|s| s.duration)
            .max()
            .unwrap_or_default()
    }

    fn total_duration(&self) -> Duration {
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Evicts the oldest segments until the total duration is within the
    /// window bound. Returns the evicted segments (still referencing their
    /// on-disk paths) so the caller can decide whether to unlink them.
    pub fn shrink(&mut self) -> Vec<Segment> {
        let mut expired = Vec::new();
        while self.total_duration() > self.window && self.segments.len() > 1 {
            expired.push(self.segments.remove(0));
        }
        expired
    }

    /// Unlinks each expired file, if `cleanup_on`. Errors are logged and
    /// swallowed: a failed unlink is not fatal to the segmenter.
    pub fn clear_expired(expired: Vec<Segment>, cleanup_on: bool) {
        if !cleanup_on {
            return;
        }
        for seg in expired {
            if let Err(e) = std::fs::remove_file(&seg.path) {
                warn!(path = %seg.path.display(), error = %e, "failed to unlink expired hls segment");
            } else {
                debug!(path = %seg.path.display(), "unlinked expired hls segment");
            }
        }
    }

    /// Unlinks every live (and any leftover temp) file and clears the
    /// window. Used when the source is torn down.
    pub fn dispose(&mut self) {
        for seg in self.segments.drain(..) {
            let _ = std::fs::remove_file(&seg.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(seq: u64, dur_ms: u64) -> Segment {
        Segment {
            sequence_no: seq,
            path: PathBuf::from(format!("/tmp/{seq}.ts")),
            uri: format!("{seq}.ts"),
            key: None,
            start_ts_ms: 0,
            end_ts_ms: dur_ms as i64,
            duration: Duration::from_millis(dur_ms),
            is_discontinuity: false,
        }
    }

    #[test]
    fn shrink_evicts_oldest_until_within_bound() {
        let mut w = FragmentWindow::new(Duration::from_secs(10));
        w.append(seg(1, 6000));
        w.append(seg(2, 6000));
        w.append(seg(3, 6000));
        let expired = w.shrink();
        assert_eq!(expired.len(), 2);
        assert_eq!(w.size(), 1);
        assert_eq!(w.first().unwrap().sequence_no, 3);
    }

    #[test]
    fn sequence_numbers_strictly_increase_in_order() {
        let mut w = FragmentWindow::new(Duration::from_secs(100));
        for i in 1..=5 {
            w.append(seg(i, 1000));
        }
        let seqs: Vec<_> = w.iter().map(|s| s.sequence_no).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn never_shrinks_below_one_segment() {
        let mut w = FragmentWindow::new(Duration::from_millis(1));
        w.append(seg(1, 6000));
        let expired = w.shrink();
        assert!(expired.is_empty());
        assert_eq!(w.size(), 1);
    }
}
