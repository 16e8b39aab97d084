//! Error types for the live source hub and HLS segmenter.

use std::sync::Arc;

/// Errors surfaced across the publisher/consumer/segmenter contracts.
///
/// Per the propagation policy: only [`LiveError::PublisherConflict`] is ever
/// returned to a publisher caller, on the initial `on_publish` call. Every
/// other variant — including [`LiveError::MalformedSequenceHeader`], which
/// can arise from `onMetaData` sanitation or sequence-header parsing — is
/// logged and absorbed by the subsystem that produced it (collaborator
/// dispatch, segment I/O, queue overflow), never failing an in-progress
/// frame delivery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LiveError {
    #[error("stream {vhost}/{app}/{stream} is already being published")]
    PublisherConflict {
        vhost: String,
        app: String,
        stream: String,
    },

    #[error("sequence header could not be parsed: {0}")]
    MalformedSequenceHeader(String),

    #[error("segment file I/O failed: {0}")]
    SegmentIo(Arc<std::io::Error>),

    #[error("playlist rename failed: {0}")]
    PlaylistRename(Arc<std::io::Error>),

    #[error("collaborator {name} failed: {source}")]
    Collaborator {
        name: &'static str,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for LiveError {
    fn from(value: std::io::Error) -> Self {
        LiveError::Io(Arc::new(value))
    }
}

pub type LiveResult<T> = Result<T, LiveError>;
