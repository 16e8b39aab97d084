use std::io;

/// Errors that can occur while demuxing or encoding FLV data.
#[derive(Debug, thiserror::Error)]
pub enum FlvError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid FLV header: {0}")]
    InvalidHeader(String),
    #[error("invalid FLV tag: {0}")]
    InvalidTag(String),
}
