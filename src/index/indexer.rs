use super::collect::{build_zettel_index, ContentScanner, MarkupScanner};
use super::memstore::{MemStore, MemStoreStats};
use crate::anteroom::{Anteroom, ArAction};
use crate::config::IndexerConfig;
use crate::errors::{StoreError, StoreResult};
use crate::id::{Zid, ZidSet};
use crate::storage::{UpdateInfo, UpdateReason, UpdateReceiver, ZettelBox};
use crate::supervise::{spawn_supervised, RestartPolicy};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStats {
    pub last_reload: Option<DateTime<Utc>>,
    pub reloads: u64,
    pub updates_since_reload: u64,
    pub index_duration_ms: u64,
    pub retries: u64,
    pub pending: usize,
    pub store: MemStoreStats,
}

#[derive(Debug, Default)]
struct Counters {
    last_reload: Option<DateTime<Utc>>,
    reloads: u64,
    since_reload: u64,
    duration: Duration,
    retries: u64,
}

/// Keeps a [`MemStore`] in line with the zettel of one box.
///
/// Change events are folded into an anteroom by a feeder task; a single
/// index task drains it and is the only writer of the store.
#[derive(Clone)]
pub struct Indexer {
    inner: Arc<IndexerInner>,
}

struct IndexerInner {
    zbox: Arc<dyn ZettelBox>,
    store: Arc<MemStore>,
    scanner: Arc<dyn ContentScanner>,
    config: IndexerConfig,
    anteroom: Mutex<Anteroom>,
    ready: Notify,
    cancel: CancellationToken,
    updates: tokio::sync::Mutex<Option<UpdateReceiver>>,
    retries: Mutex<HashMap<Zid, u32>>,
    counters: Mutex<Counters>,
}

impl Indexer {
    pub fn new(zbox: Arc<dyn ZettelBox>, store: Arc<MemStore>, config: IndexerConfig) -> Self {
        Self::with_scanner(zbox, store, Arc::new(MarkupScanner), config)
    }

    pub fn with_scanner(
        zbox: Arc<dyn ZettelBox>,
        store: Arc<MemStore>,
        scanner: Arc<dyn ContentScanner>,
        config: IndexerConfig,
    ) -> Self {
        let anteroom = Anteroom::new(config.max_anteroom_load);
        Self {
            inner: Arc::new(IndexerInner {
                zbox,
                store,
                scanner,
                config,
                anteroom: Mutex::new(anteroom),
                ready: Notify::new(),
                cancel: CancellationToken::new(),
                updates: tokio::sync::Mutex::new(None),
                retries: Mutex::new(HashMap::new()),
                counters: Mutex::new(Counters::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<MemStore> {
        &self.inner.store
    }

    /// Starts the feeder and the index task. Both restart after a panic;
    /// queued work survives in the anteroom.
    pub fn start(&self, updates: UpdateReceiver) -> StoreResult<()> {
        match self.inner.updates.try_lock() {
            Ok(mut slot) if slot.is_none() => *slot = Some(updates),
            _ => return Err(StoreError::Internal("indexer already started".to_string())),
        }
        let feeder = self.inner.clone();
        spawn_supervised(
            "indexer feeder",
            self.inner.cancel.clone(),
            RestartPolicy::default(),
            move || feeder.clone().feed(),
        );
        let worker = self.inner.clone();
        spawn_supervised(
            "indexer",
            self.inner.cancel.clone(),
            RestartPolicy::default(),
            move || worker.clone().run(),
        );
        tracing::info!(location = %self.inner.zbox.location(), "indexer started");
        Ok(())
    }

    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    /// Drops pending work and schedules a full re-scan of the box.
    pub fn refresh(&self) {
        self.inner.anteroom.lock().reset();
        self.inner.ready.notify_one();
    }

    pub fn stats(&self) -> IndexerStats {
        let (last_reload, reloads, updates_since_reload, duration, retries) = {
            let counters = self.inner.counters.lock();
            (
                counters.last_reload,
                counters.reloads,
                counters.since_reload,
                counters.duration,
                counters.retries,
            )
        };
        IndexerStats {
            last_reload,
            reloads,
            updates_since_reload,
            index_duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            retries,
            pending: self.inner.anteroom.lock().len(),
            store: self.inner.store.stats(),
        }
    }
}

impl IndexerInner {
    async fn feed(self: Arc<Self>) {
        let mut slot = self.updates.lock().await;
        let Some(rx) = slot.as_mut() else {
            return;
        };
        loop {
            let info = tokio::select! {
                _ = self.cancel.cancelled() => break,
                info = rx.recv() => info,
            };
            let Some(info) = info else {
                tracing::debug!("change channel closed, feeder exits");
                break;
            };
            self.accept(&info);
        }
    }

    fn accept(&self, info: &UpdateInfo) {
        tracing::trace!(origin = %info.origin, zid = %info.zid, reason = ?info.reason, "change received");
        {
            let mut anteroom = self.anteroom.lock();
            match info.reason {
                UpdateReason::OnZettel => anteroom.enqueue(info.zid, ArAction::Update),
                UpdateReason::OnDelete => anteroom.enqueue(info.zid, ArAction::Delete),
                UpdateReason::OnReload => anteroom.reset(),
            }
        }
        self.ready.notify_one();
    }

    async fn run(self: Arc<Self>) {
        while !self.cancel.is_cancelled() {
            let next = self.anteroom.lock().dequeue();
            let Some((action, zid)) = next else {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.ready.notified() => continue,
                    _ = tokio::time::sleep(self.config.idle_wait()) => {}
                }
                if self.counters.lock().last_reload.is_none() {
                    self.reload();
                }
                continue;
            };

            let started = Instant::now();
            match action {
                ArAction::Reload => self.reload(),
                ArAction::Update => self.update(zid).await,
                ArAction::Delete => self.delete(zid),
            }
            self.counters.lock().duration += started.elapsed();
            tokio::task::yield_now().await;
        }
    }

    fn reload(&self) {
        let existing = match self.zbox.fetch_zids() {
            Ok(existing) => existing,
            Err(error) => {
                tracing::warn!(error = %error, "listing zettel for index reload failed");
                return;
            }
        };
        let deleted: Vec<Zid> = self
            .store
            .indexed_zids()
            .iter()
            .filter(|zid| !existing.contains(*zid))
            .collect();
        self.anteroom.lock().reload(&deleted, &existing);
        {
            let mut counters = self.counters.lock();
            counters.last_reload = Some(Utc::now());
            counters.reloads += 1;
            counters.since_reload = 0;
        }
        tracing::debug!(zettel = existing.len(), deleted = deleted.len(), "index reload scheduled");
    }

    async fn update(self: &Arc<Self>, zid: Zid) {
        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return,
            fetched = self.zbox.get_zettel(zid) => fetched,
        };
        match fetched {
            Ok(zettel) => {
                let zidx = build_zettel_index(&zettel, self.scanner.as_ref(), &|target: Zid| {
                    self.zbox.has_zettel(target)
                });
                let to_check = self.store.update_references(&zidx);
                self.retries.lock().remove(&zid);
                self.requeue(&to_check);
                self.counters.lock().since_reload += 1;
            }
            Err(StoreError::NotFound(_)) => self.delete(zid),
            Err(error) if error.is_retryable() => self.retry(ArAction::Update, zid, &error),
            Err(error) => {
                tracing::warn!(zid = %zid, error = %error, "indexing zettel failed");
            }
        }
    }

    fn delete(&self, zid: Zid) {
        let to_check = self.store.delete_zettel(zid);
        self.retries.lock().remove(&zid);
        self.requeue(&to_check);
        self.counters.lock().since_reload += 1;
    }

    /// Queues `action` again after the configured delay, unless `zid` has
    /// used up its attempts.
    fn retry(self: &Arc<Self>, action: ArAction, zid: Zid, error: &StoreError) {
        let attempts = {
            let mut retries = self.retries.lock();
            let attempts = retries.entry(zid).or_insert(0);
            *attempts += 1;
            *attempts
        };
        if attempts > self.config.max_retries {
            self.retries.lock().remove(&zid);
            tracing::warn!(zid = %zid, error = %error, attempts, "giving up on zettel");
            return;
        }
        tracing::debug!(zid = %zid, error = %error, attempts, "retrying zettel later");
        self.counters.lock().retries += 1;
        let inner = self.clone();
        let delay = self.config.retry_delay();
        tokio::spawn(async move {
            tokio::select! {
                _ = inner.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    inner.anteroom.lock().enqueue(zid, action);
                    inner.ready.notify_one();
                }
            }
        });
    }

    fn requeue(&self, zids: &ZidSet) {
        if zids.is_empty() {
            return;
        }
        let mut anteroom = self.anteroom.lock();
        for zid in zids.iter() {
            anteroom.enqueue(zid, ArAction::Update);
        }
    }
}
