//! Async reap-notification dispatch.
//!
//! Submission never blocks the segmenter: the channel is bounded but
//! `try_send` drops the event (with a log) rather than stalling the
//! publisher when the worker has fallen behind.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(200);
const QUEUE_CAPACITY: usize = 256;

/// Everything a reap-notification hook needs, captured by value so it
/// outlives the (possibly already-unlinked-by-eviction) live `Segment`.
#[derive(Debug, Clone)]
pub struct HlsReapEvent {
    pub path: PathBuf,
    pub uri: String,
    pub playlist_path: PathBuf,
    pub playlist_uri: String,
    pub sequence_no: u64,
    pub duration: Duration,
}

/// Collaborator seam for HLS reap notifications. Implementations are
/// expected to perform their own I/O (HTTP POST, DVR index update, ...);
/// failures are retried a bounded number of times and then dropped with a
/// log, never propagated back to the publisher.
pub trait HlsHook: Send + Sync + 'static {
    fn on_hls(&self, event: &HlsReapEvent) -> Result<(), String>;
    fn on_hls_notify(&self, uri: &str) -> Result<(), String>;
}

enum HookJob {
    OnHls(HlsReapEvent),
    OnHlsNotify(String),
}

/// Handle to the background dispatch worker.
#[derive(Clone)]
pub struct HookDispatcher {
    tx: mpsc::Sender<HookJob>,
}

impl HookDispatcher {
    /// Spawns the worker task and returns a handle to submit jobs to it.
    pub fn spawn(hook: Arc<dyn HlsHook>) -> Self {
        let (tx, mut rx) = mpsc::channel::<HookJob>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                run_with_retries(&*hook, job).await;
            }
        });

        Self { tx }
    }

    /// Submits a reap event + URI notification pair. Never blocks; drops
    /// and logs on a full queue.
    pub fn notify_reap(&self, event: HlsReapEvent) {
        let uri = event.uri.clone();
        if self.tx.try_send(HookJob::OnHls(event)).is_err() {
            warn!("hls hook queue full, dropping on_hls notification");
        }
        if self.tx.try_send(HookJob::OnHlsNotify(uri)).is_err() {
            warn!("hls hook queue full, dropping on_hls_notify notification");
        }
    }
}

async fn run_with_retries(hook: &dyn HlsHook, job: HookJob) {
    for attempt in 0..=MAX_RETRIES {
        let result = match &job {
            HookJob::OnHls(event) => hook.on_hls(event),
            HookJob::OnHlsNotify(uri) => hook.on_hls_notify(uri),
        };
        match result {
            Ok(()) => return,
            Err(e) if attempt < MAX_RETRIES => {
                warn!(attempt, error = %e, "hls hook failed, retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(e) => {
                warn!(error = %e, "hls hook failed permanently, dropping notification");
            }
        }
    }
}

/// A hook that does nothing, for sources with no collaborator configured.
pub struct NoopHook;

impl HlsHook for NoopHook {
    fn on_hls(&self, _event: &HlsReapEvent) -> Result<(), String> {
        Ok(())
    }

    fn on_hls_notify(&self, _uri: &str) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHook {
        calls: Arc<AtomicUsize>,
    }

    impl HlsHook for CountingHook {
        fn on_hls(&self, _event: &HlsReapEvent) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn on_hls_notify(&self, _uri: &str) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatch_invokes_both_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = Arc::new(CountingHook { calls: calls.clone() });
        let dispatcher = HookDispatcher::spawn(hook);

        dispatcher.notify_reap(HlsReapEvent {
            path: PathBuf::from("/tmp/1.ts"),
            uri: "1.ts".to_string(),
            playlist_path: PathBuf::from("/tmp/playlist.m3u8"),
            playlist_uri: "playlist.m3u8".to_string(),
            sequence_no: 1,
            duration: Duration::from_secs(6),
        });

        // Give the background task a chance to drain the queue.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
