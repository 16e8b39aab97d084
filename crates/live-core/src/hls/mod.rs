//! HLS segmenter: converts a frame stream into a rolling window of on-disk
//! segments plus an atomically-rewritten playlist.

pub mod encoder;
pub mod fmp4_encoder;
pub mod hooks;
pub mod key;
pub mod playlist;
pub mod segmenter;
pub mod ts_encoder;

pub use encoder::SegmentEncoder;
pub use segmenter::{HlsSegmenter, HlsSegmenterConfig, PathContext};
