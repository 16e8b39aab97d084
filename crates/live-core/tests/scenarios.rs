//! End-to-end scenarios driving a [`LiveSource`] + [`HlsSink`] pair
//! through the public API, the way a publisher's frames actually flow in
//! production.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use live_core::config::VhostConfig;
use live_core::frame::{CodecKind, Frame};
use live_core::hls::ts_encoder::TsEncoder;
use live_core::hls::{HlsSegmenter, HlsSegmenterConfig, PathContext};
use live_core::hub::HlsSink;
use live_core::{LiveSource, OriginHub};

fn path_ctx(dir: &std::path::Path) -> (PathContext, HlsSegmenterConfig) {
    let ctx = PathContext {
        vhost: "__defaultVhost__".to_string(),
        app: "live".to_string(),
        stream: "s1".to_string(),
        date_token: "20260728".to_string(),
        hour_token: "03".to_string(),
    };
    let config = HlsSegmenterConfig {
        fragment: Duration::from_millis(6000),
        td_ratio: 1.2,
        aof_ratio: 2.0,
        window: Duration::from_secs(60),
        ts_floor: false,
        cleanup: true,
        wait_keyframe: true,
        keys_enabled: false,
        fragments_per_key: 0,
        base_dir: dir.to_path_buf(),
        segment_template: "[stream]-[seq]".to_string(),
        key_template: "[seq].key".to_string(),
        key_url_template: "[seq].key".to_string(),
    };
    (ctx, config)
}

fn video(ts: i64, keyframe: bool, sh: bool) -> Frame {
    Frame {
        timestamp_ms: ts,
        dts_ms: ts,
        codec: CodecKind::Avc,
        payload: Bytes::from_static(&[0, 0, 0, 1, 0x65, 0, 0, 0]),
        is_video: true,
        is_audio: false,
        is_sequence_header: sh,
        is_keyframe: keyframe,
    }
}

fn audio(ts: i64, sh: bool) -> Frame {
    Frame {
        timestamp_ms: ts,
        dts_ms: ts,
        codec: CodecKind::Aac,
        payload: Bytes::from_static(&[0xAA; 32]),
        is_video: false,
        is_audio: true,
        is_sequence_header: sh,
        is_keyframe: false,
    }
}

fn build_hub(dir: &std::path::Path) -> (Arc<OriginHub>, Arc<HlsSink>) {
    let (ctx, config) = path_ctx(dir);
    let segmenter = HlsSegmenter::new(config, ctx, Box::new(TsEncoder::new()));
    let sink = HlsSink::new(segmenter);
    let source = LiveSource::new("__defaultVhost__", "live", "s1", VhostConfig::default());
    let hub = Arc::new(OriginHub::new(source));
    hub.add_sink(sink.clone());
    (hub, sink)
}

#[test]
fn s1_basic_reap_with_keyframe_wait_produces_two_full_segments() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _sink) = build_hub(dir.path());
    hub.publish().unwrap();

    hub.push_frame(video(0, true, true));
    hub.push_frame(audio(0, true));
    hub.push_frame(video(0, true, false));

    let mut t = 40;
    while t < 7200 {
        hub.push_frame(video(t, false, false));
        t += 40;
    }
    hub.push_frame(video(7200, true, false));
    t = 7240;
    while t < 14400 {
        hub.push_frame(video(t, false, false));
        t += 40;
    }
    hub.push_frame(video(14400, true, false));

    // Two full 7200ms segments should have been reaped; a third remains open.
    // Since HlsSink owns the segmenter internally we can only assert via
    // files on disk and the playlist, both written by the reap path.
    let playlist_path = dir.path().join("playlist.m3u8");
    let contents = std::fs::read_to_string(&playlist_path).unwrap();
    assert!(contents.contains("#EXT-X-TARGETDURATION:8"));
    let segment_files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "ts"))
        .collect();
    assert_eq!(segment_files.len(), 2);
}

#[test]
fn s2_sequence_header_change_emits_discontinuity_marker() {
    let dir = tempfile::tempdir().unwrap();
    let (hub, _sink) = build_hub(dir.path());
    hub.publish().unwrap();

    hub.push_frame(video(0, true, true));
    let mut t = 40;
    while t < 7300 {
        hub.push_frame(video(t, false, false));
        t += 40;
    }
    hub.push_frame(video(t, true, false));
    t += 40;

    // Changed SPS: new sequence header mid-stream.
    hub.push_frame(video(t, false, true));
    let mut t2 = t + 40;
    while t2 < t + 7300 {
        hub.push_frame(video(t2, false, false));
        t2 += 40;
    }
    hub.push_frame(video(t2, true, false));

    let contents = std::fs::read_to_string(dir.path().join("playlist.m3u8")).unwrap();
    assert!(contents.contains("#EXT-X-DISCONTINUITY"));
}

#[test]
fn s3_late_joining_consumer_sees_cached_sequence_headers_and_gop_first() {
    let source = LiveSource::new("__defaultVhost__", "live", "s3", VhostConfig::default());
    source.on_publish().unwrap();

    source.on_frame(audio(0, true)).unwrap();
    source.on_frame(video(0, true, true)).unwrap();
    for i in 1..125 {
        source.on_frame(video(i * 40, false, false)).unwrap();
    }
    source.on_frame(video(5000, true, false)).unwrap();

    let consumer = source.create_consumer();
    let received = tokio_test_block_on(consumer.recv(5));

    assert!(received[0].is_sequence_header);
    assert!(received.iter().any(|f| f.is_audio && f.is_sequence_header));
    assert!(received.iter().any(|f| f.is_video && f.is_sequence_header));
}

#[test]
fn s4_consumer_overflow_shrinks_to_sequence_headers_only() {
    let source = LiveSource::new(
        "__defaultVhost__",
        "live",
        "s4",
        VhostConfig {
            queue_length: Duration::from_millis(2000),
            ..VhostConfig::default()
        },
    );
    source.on_publish().unwrap();
    source.on_frame(video(0, true, true)).unwrap();
    source.on_frame(audio(0, true)).unwrap();

    let consumer = source.create_consumer();
    // Never drained: publisher runs for 5s at 120fps (~8.3ms/frame).
    let mut t: i64 = 0;
    while t < 5000 {
        source.on_frame(video(t, false, false)).unwrap();
        t += 8;
    }

    assert!(consumer.queue_len() <= 2);
}

#[test]
fn s5_pure_audio_overflow_reaps_without_keyframe() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, mut config) = path_ctx(dir.path());
    config.fragment = Duration::from_millis(4000);
    config.aof_ratio = 2.0;
    let segmenter = HlsSegmenter::new(config, ctx, Box::new(TsEncoder::new()));
    let sink = HlsSink::new(segmenter);
    let source = LiveSource::new("__defaultVhost__", "live", "s5", VhostConfig::default());
    let hub = OriginHub::new(source);
    hub.add_sink(sink);
    hub.publish().unwrap();

    let mut t = 0;
    while t <= 8200 {
        hub.push_frame(audio(t, false));
        t += 20;
    }

    let segment_files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "ts"))
        .collect();
    assert!(!segment_files.is_empty());
}

#[test]
fn s6_tiny_segment_is_dropped_and_playlist_stays_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let (ctx, mut config) = path_ctx(dir.path());
    config.fragment = Duration::from_millis(50);
    config.wait_keyframe = false;
    let mut segmenter = HlsSegmenter::new(config, ctx, Box::new(TsEncoder::new()));

    segmenter.on_frame(&video(0, true, false), 0).unwrap();
    segmenter.on_frame(&video(90, true, false), 0).unwrap();
    segmenter.force_reap().unwrap();

    assert_eq!(segmenter.window().size(), 0);
    assert!(!dir.path().join("playlist.m3u8").exists());
}

/// Minimal single-threaded executor for the one `async fn` in this suite —
/// avoids pulling `#[tokio::test]` into every scenario when only one needs
/// to await a `Consumer::recv`.
fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(fut)
}
