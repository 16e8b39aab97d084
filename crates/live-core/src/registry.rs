//! Process-wide table of live sources, with a periodic sweep that tears
//! down abandoned streams.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pipeline_common::CancellationToken;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::VhostConfig;
use crate::hub::OriginHub;
use crate::source::LiveSource;

const CLEANUP_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct StreamKey {
    pub vhost: String,
    pub app: String,
    pub stream: String,
}

impl StreamKey {
    pub fn new(vhost: impl Into<String>, app: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            vhost: vhost.into(),
            app: app.into(),
            stream: stream.into(),
        }
    }
}

/// Owns every currently-registered [`OriginHub`] and, once started, runs a
/// 1-second sweep that collects sources which are not publishing, have no
/// consumers, and have been idle past `stream_dispose_delay()`.
pub struct SourceRegistry {
    hubs: Mutex<HashMap<StreamKey, Arc<OriginHub>>>,
    cancel: CancellationToken,
}

impl SourceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            hubs: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Finds or creates the hub for `key`, using `config` only on first
    /// creation — an already-live source keeps whatever config it was
    /// created with.
    pub fn get_or_create(self: &Arc<Self>, key: StreamKey, config: VhostConfig) -> Arc<OriginHub> {
        let mut hubs = self.hubs.lock();
        hubs.entry(key.clone())
            .or_insert_with(|| {
                let source = LiveSource::new(key.vhost.clone(), key.app.clone(), key.stream.clone(), config);
                Arc::new(OriginHub::new(source))
            })
            .clone()
    }

    pub fn get(&self, key: &StreamKey) -> Option<Arc<OriginHub>> {
        self.hubs.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &StreamKey) {
        self.hubs.lock().remove(key);
    }

    pub fn len(&self) -> usize {
        self.hubs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.lock().is_empty()
    }

    /// Runs one collection pass: any hub whose source can no longer be
    /// collected (still publishing, still has consumers, or its dispose
    /// grace period has not elapsed) is left alone; everything else is
    /// dropped. `now_ms` is caller-supplied wall-clock time.
    pub fn collect(&self, now_ms: i64) {
        let mut hubs = self.hubs.lock();
        hubs.retain(|key, hub| {
            let source = &hub.source;
            if source.is_publishing() || source.consumer_count() > 0 {
                return true;
            }
            let grace_ms = source.config().stream_dispose_delay().as_millis() as i64;
            let idle_for = now_ms - source.last_activity_ms();
            let collectable = idle_for > grace_ms;
            if collectable {
                info!(vhost = %key.vhost, app = %key.app, stream = %key.stream, "collecting idle live source");
            }
            !collectable
        });
    }

    /// Spawns the background cleanup tick. Call once per process; the
    /// returned handle is cancelled (and the task joined) via
    /// [`SourceRegistry::shutdown`].
    pub fn spawn_cleanup(self: &Arc<Self>, now_ms: impl Fn() -> i64 + Send + 'static) -> JoinHandle<()> {
        let registry = self.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_TICK);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => registry.collect(now_ms()),
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
