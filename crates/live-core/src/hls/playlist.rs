//! Playlist rendering and atomic rewrite.

use std::io::Write;
use std::path::Path;

use m3u8_rs::{Key, MediaPlaylist, MediaSegment, Map};
use tracing::{error, warn};

use crate::error::LiveResult;
use crate::window::FragmentWindow;

/// Builds the `m3u8_rs::MediaPlaylist` for the current window contents.
///
/// `version` and `init_map_uri` come from the active [`super::encoder::SegmentEncoder`]
/// (3/no map for TS, 7/`EXT-X-MAP` for fMP4). `active_key` is the
/// currently-rotated AES key, if encryption is enabled — its URI is emitted
/// on the segment where the rotation took effect and implicitly applies to
/// every subsequent segment until the next rotation marker.
pub fn build_playlist(
    window: &FragmentWindow,
    version: u64,
    init_map_uri: Option<&str>,
    max_td: std::time::Duration,
    key_for_segment: impl Fn(u64) -> Option<(String, String)>,
) -> MediaPlaylist {
    let target_duration = window
        .max_duration()
        .max(max_td)
        .as_secs_f32()
        .ceil()
        .max(1.0);

    let mut segments = Vec::with_capacity(window.size());
    let mut last_key_uri: Option<String> = None;

    for seg in window.iter() {
        let key = key_for_segment(seg.sequence_no).map(|(uri, iv)| {
            last_key_uri = Some(uri.clone());
            Key {
                method: m3u8_rs::KeyMethod::AES128,
                uri: Some(uri),
                iv: Some(format!("0x{iv}")),
                keyformat: None,
                keyformatversions: None,
            }
        });

        segments.push(MediaSegment {
            uri: seg.uri.clone(),
            duration: seg.duration.as_secs_f32(),
            title: None,
            byte_range: None,
            discontinuity: seg.is_discontinuity,
            key,
            map: None,
            program_date_time: None,
            daterange: None,
            unknown_tags: Vec::new(),
        });
    }

    MediaPlaylist {
        version: Some(version),
        target_duration,
        media_sequence: window.first().map(|s| s.sequence_no).unwrap_or(0),
        segments,
        discontinuity_sequence: 0,
        end_list: false,
        playlist_type: None,
        i_frames_only: false,
        start: None,
        independent_segments: false,
        unknown_tags: Vec::new(),
    }
    .with_init_map(init_map_uri)
}

trait WithInitMap {
    fn with_init_map(self, uri: Option<&str>) -> Self;
}

impl WithInitMap for MediaPlaylist {
    fn with_init_map(mut self, uri: Option<&str>) -> Self {
        if let (Some(uri), Some(first)) = (uri, self.segments.first_mut()) {
            first.map = Some(Map {
                uri: uri.to_string(),
                byte_range: None,
            });
        }
        self
    }
}

/// Writes `playlist` to `playlist.tmp` then atomically renames it to
/// `final_path`, removing any leftover temp file from a prior failed
/// attempt. On rename failure the previous playlist is left untouched
/// (rename is atomic, so a failed write never corrupts it).
pub fn write_playlist_atomic(final_path: &Path, playlist: &MediaPlaylist) -> LiveResult<()> {
    let tmp_path = final_path.with_extension("tmp");

    let result = (|| -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp_path)?;
        let mut buf = Vec::new();
        playlist
            .write_to(&mut buf)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.write_all(&buf)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, final_path)?;
        Ok(())
    })();

    if let Err(e) = &result {
        error!(path = %final_path.display(), error = %e, "failed to rewrite hls playlist, keeping previous version");
        if tmp_path.exists() {
            if let Err(rm_err) = std::fs::remove_file(&tmp_path) {
                warn!(path = %tmp_path.display(), error = %rm_err, "failed to clean up leftover playlist tmp file");
            }
        }
    }

    result.map_err(crate::error::LiveError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::Segment;
    use std::path::PathBuf;
    use std::time::Duration;

    fn seg(seq: u64, dur_ms: u64, disc: bool) -> Segment {
        Segment {
            sequence_no: seq,
            path: PathBuf::from(format!("/tmp/{seq}.ts")),
            uri: format!("{seq}.ts"),
            key: None,
            start_ts_ms: 0,
            end_ts_ms: dur_ms as i64,
            duration: Duration::from_millis(dur_ms),
            is_discontinuity: disc,
        }
    }

    #[test]
    fn target_duration_reflects_max_segment_and_max_td() {
        let mut w = FragmentWindow::new(Duration::from_secs(60));
        w.append(seg(1, 7200, false));
        w.append(seg(2, 7200, false));
        let playlist = build_playlist(&w, 3, None, Duration::from_millis(7200), |_| None);
        assert_eq!(playlist.target_duration, 8.0);
        assert_eq!(playlist.media_sequence, 1);
    }

    #[test]
    fn discontinuity_flag_survives_into_segment() {
        let mut w = FragmentWindow::new(Duration::from_secs(60));
        w.append(seg(1, 6000, false));
        w.append(seg(2, 6000, true));
        let playlist = build_playlist(&w, 3, None, Duration::from_millis(6000), |_| None);
        assert!(!playlist.segments[0].discontinuity);
        assert!(playlist.segments[1].discontinuity);
    }

    #[test]
    fn atomic_write_round_trips_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut w = FragmentWindow::new(Duration::from_secs(60));
        w.append(seg(1, 6000, false));
        let playlist = build_playlist(&w, 3, None, Duration::from_millis(6000), |_| None);
        let path = dir.path().join("playlist.m3u8");
        write_playlist_atomic(&path, &playlist).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("#EXTM3U"));
        assert!(contents.contains("EXT-X-MEDIA-SEQUENCE:1"));
    }
}
