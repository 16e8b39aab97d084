// HLS (HTTP Live Streaming) parser implementation
pub mod segment;

// Export common types for ease of use
pub use segment::{
    HlsData, M4sData, M4sInitSegmentData, M4sSegmentData, SegmentType, TsSegmentData,
};
