//! Live media source hub: ingest fan-out, GOP/metadata caching, jitter
//! correction and an HLS segmenter, decoupled from any particular
//! ingest protocol (RTMP/RTSP/WebRTC/GB28181 all produce the same
//! [`frame::Frame`] shape before reaching this crate).

pub mod cache;
pub mod config;
pub mod error;
pub mod frame;
pub mod frame_queue;
pub mod hls;
pub mod hub;
pub mod jitter;
pub mod metadata;
pub mod reorder;
pub mod registry;
pub mod source;
pub mod window;

pub use config::VhostConfig;
pub use error::{LiveError, LiveResult};
pub use frame::Frame;
pub use hub::OriginHub;
pub use registry::{SourceRegistry, StreamKey};
pub use source::{Consumer, EdgeOrigin, FrameSink, LiveSource};
