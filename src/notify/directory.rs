use super::entry::{delete_from_entry, update_entry, DirEntry};
use super::{Event, EventReceiver, Notifier};
use crate::errors::{StoreError, StoreResult};
use crate::id::{seek_zid, Zid};
use crate::storage::{publish, StartState, UpdateReason, UpdateSender};
use crate::supervise::{spawn_supervised, RestartPolicy};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type EntrySet = HashMap<Zid, DirEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirServiceState {
    Created,
    Starting,
    Working,
    Missing,
    Stopping,
}

/// Catalog of directory entries, kept in sync with one notifier.
#[derive(Clone)]
pub struct DirService {
    inner: Arc<DirInner>,
}

struct DirInner {
    origin: Arc<str>,
    state: RwLock<DirServiceState>,
    /// `None` while the directory is missing or not yet scanned.
    entries: RwLock<Option<EntrySet>>,
    updates: UpdateSender,
    notifier: Mutex<Option<Box<dyn Notifier>>>,
    cancel: CancellationToken,
    events: Arc<tokio::sync::Mutex<EventLoop>>,
}

struct EventLoop {
    rx: Option<EventReceiver>,
    /// Catalog being built by the current scan.
    shadow: Option<EntrySet>,
}

impl DirService {
    pub fn new(origin: impl Into<Arc<str>>, updates: UpdateSender) -> Self {
        Self {
            inner: Arc::new(DirInner {
                origin: origin.into(),
                state: RwLock::new(DirServiceState::Created),
                entries: RwLock::new(None),
                updates,
                notifier: Mutex::new(None),
                cancel: CancellationToken::new(),
                events: Arc::new(tokio::sync::Mutex::new(EventLoop {
                    rx: None,
                    shadow: None,
                })),
            }),
        }
    }

    /// Starts consuming `events`. The event loop restarts itself after a
    /// panic and keeps any scan in progress.
    pub fn start(&self, notifier: Box<dyn Notifier>, events: EventReceiver) -> StoreResult<()> {
        {
            let mut state = self.inner.state.write();
            if *state != DirServiceState::Created {
                return Err(StoreError::Internal(format!(
                    "directory service {} already started",
                    self.inner.origin
                )));
            }
            *state = DirServiceState::Starting;
        }
        *self.inner.notifier.lock() = Some(notifier);
        match self.inner.events.try_lock() {
            Ok(mut event_loop) => event_loop.rx = Some(events),
            Err(_) => {
                return Err(StoreError::Internal("event loop busy during start".to_string()))
            }
        }

        let inner = self.inner.clone();
        spawn_supervised(
            format!("dirservice {}", self.inner.origin),
            self.inner.cancel.clone(),
            RestartPolicy::default(),
            move || inner.clone().run(),
        );
        Ok(())
    }

    pub fn stop(&self) {
        *self.inner.state.write() = DirServiceState::Stopping;
        if let Some(notifier) = self.inner.notifier.lock().take() {
            notifier.close();
        }
        self.inner.cancel.cancel();
    }

    pub fn refresh(&self) {
        if let Some(notifier) = self.inner.notifier.lock().as_ref() {
            notifier.refresh();
        }
    }

    pub fn state(&self) -> DirServiceState {
        *self.inner.state.read()
    }

    /// The service state as reported by a box built on top of it.
    pub fn start_state(&self) -> StartState {
        match self.state() {
            DirServiceState::Created => StartState::Stopped,
            DirServiceState::Starting => StartState::Starting,
            DirServiceState::Working | DirServiceState::Missing => StartState::Started,
            DirServiceState::Stopping => StartState::Stopping,
        }
    }

    pub fn num_entries(&self) -> usize {
        self.inner.entries.read().as_ref().map_or(0, HashMap::len)
    }

    /// Copies of all entries accepted by `constraint`, sorted by zid.
    pub fn get_entries(&self, constraint: impl Fn(Zid) -> bool) -> Vec<DirEntry> {
        let entries = self.inner.entries.read();
        let Some(entries) = entries.as_ref() else {
            return Vec::new();
        };
        let mut result: Vec<DirEntry> = entries
            .values()
            .filter(|entry| constraint(entry.zid))
            .cloned()
            .collect();
        result.sort_by_key(|entry| entry.zid);
        result
    }

    pub fn get_entry(&self, zid: Zid) -> Option<DirEntry> {
        self.inner
            .entries
            .read()
            .as_ref()
            .and_then(|entries| entries.get(&zid).cloned())
    }

    /// Reserves a fresh identifier with an empty entry.
    pub fn set_new_dir_entry(&self) -> StoreResult<Zid> {
        let mut guard = self.inner.entries.write();
        let entries = guard.as_mut().ok_or_else(|| self.inner.no_directory())?;
        let zid = Zid::new_with(true, |candidate| !entries.contains_key(&candidate))?;
        entries.insert(zid, DirEntry::new(zid));
        Ok(zid)
    }

    pub fn update_dir_entry(&self, entry: DirEntry) -> StoreResult<()> {
        let mut guard = self.inner.entries.write();
        let entries = guard.as_mut().ok_or_else(|| self.inner.no_directory())?;
        entries.insert(entry.zid, entry);
        Ok(())
    }

    pub fn delete_dir_entry(&self, zid: Zid) -> StoreResult<()> {
        let mut guard = self.inner.entries.write();
        let entries = guard.as_mut().ok_or_else(|| self.inner.no_directory())?;
        entries.remove(&zid);
        Ok(())
    }

    /// Moves `old` to `new_zid` and returns the entry registered under the new
    /// identifier.
    pub fn rename_dir_entry(&self, old: &DirEntry, new_zid: Zid) -> StoreResult<DirEntry> {
        let mut guard = self.inner.entries.write();
        let entries = guard.as_mut().ok_or_else(|| self.inner.no_directory())?;
        if entries.contains_key(&new_zid) {
            return Err(StoreError::InvalidZid(format!("{new_zid} already exists")));
        }
        let renamed = old.renamed(new_zid);
        entries.remove(&old.zid);
        entries.insert(new_zid, renamed.clone());
        Ok(renamed)
    }
}

impl DirInner {
    fn no_directory(&self) -> StoreError {
        StoreError::NoDirectory(self.origin.to_string())
    }

    async fn run(self: Arc<Self>) {
        let mut event_loop = self.events.lock().await;
        let Some(mut rx) = event_loop.rx.take() else {
            return;
        };
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            let Some(event) = event else {
                tracing::debug!(origin = %self.origin, "notifier closed its event channel");
                break;
            };
            // Put the receiver back first so a panic while handling the event
            // does not lose it.
            event_loop.rx = Some(rx);
            self.handle_event(event, &mut event_loop.shadow);
            let Some(next_rx) = event_loop.rx.take() else {
                break;
            };
            rx = next_rx;
        }
    }

    fn handle_event(&self, event: Event, shadow: &mut Option<EntrySet>) {
        if *self.state.read() == DirServiceState::Stopping {
            return;
        }
        tracing::trace!(origin = %self.origin, event = ?event, "directory event");
        match event {
            Event::Make => *shadow = Some(EntrySet::new()),
            Event::List(name) if name.is_empty() => self.finish_scan(shadow.take()),
            Event::Ready => self.finish_scan(shadow.take()),
            Event::List(name) => match shadow.as_mut() {
                Some(entries) => {
                    fold_update(entries, &name);
                }
                None => {
                    tracing::warn!(origin = %self.origin, file = %name, "listed file outside of a scan");
                }
            },
            Event::Update(name) => {
                if let Some(entries) = shadow.as_mut() {
                    fold_update(entries, &name);
                }
                let zid = {
                    let mut guard = self.entries.write();
                    match guard.as_mut() {
                        Some(entries) => fold_update(entries, &name),
                        None => Zid::INVALID,
                    }
                };
                if zid.is_valid() {
                    publish(&self.updates, &self.origin, UpdateReason::OnZettel, zid);
                }
            }
            Event::Delete(name) => {
                if let Some(entries) = shadow.as_mut() {
                    fold_delete(entries, &name);
                }
                let outcome = {
                    let mut guard = self.entries.write();
                    guard.as_mut().and_then(|entries| fold_delete(entries, &name))
                };
                if let Some((zid, still_live)) = outcome {
                    let reason = if still_live {
                        UpdateReason::OnZettel
                    } else {
                        UpdateReason::OnDelete
                    };
                    publish(&self.updates, &self.origin, reason, zid);
                }
            }
            Event::Destroy => {
                *shadow = None;
                let previous = self.entries.write().take();
                *self.state.write() = DirServiceState::Missing;
                tracing::error!(origin = %self.origin, "zettel directory vanished");
                if let Some(previous) = previous {
                    let mut zids: Vec<Zid> = previous.into_keys().collect();
                    zids.sort();
                    for zid in zids {
                        publish(&self.updates, &self.origin, UpdateReason::OnDelete, zid);
                    }
                }
            }
            Event::Error(message) => {
                *shadow = None;
                tracing::warn!(origin = %self.origin, error = %message, "notifier reported an error");
            }
        }
    }

    fn finish_scan(&self, scanned: Option<EntrySet>) {
        let scanned = match scanned {
            Some(scanned) => scanned,
            None if self.entries.read().is_none() => EntrySet::new(),
            None => {
                tracing::warn!(origin = %self.origin, "end of scan without a scan in progress");
                return;
            }
        };
        let mut current: Vec<Zid> = scanned.keys().copied().collect();
        current.sort();
        let mut vanished: Vec<Zid> = {
            let mut guard = self.entries.write();
            let previous = guard.replace(scanned);
            previous
                .map(|previous| {
                    previous
                        .into_keys()
                        .filter(|zid| current.binary_search(zid).is_err())
                        .collect()
                })
                .unwrap_or_default()
        };
        vanished.sort();

        let previous_state = std::mem::replace(&mut *self.state.write(), DirServiceState::Working);
        if previous_state != DirServiceState::Working {
            tracing::info!(origin = %self.origin, zettel = current.len(), "zettel directory found");
        }
        for zid in current {
            publish(&self.updates, &self.origin, UpdateReason::OnZettel, zid);
        }
        for zid in vanished {
            publish(&self.updates, &self.origin, UpdateReason::OnDelete, zid);
        }
    }
}

/// Folds `name` into its entry; returns the entry's zid, or `Zid::INVALID`
/// for names without an identifier.
fn fold_update(entries: &mut EntrySet, name: &str) -> Zid {
    let zid = seek_zid(name);
    if !zid.is_valid() {
        return Zid::INVALID;
    }
    let entry = entries.entry(zid).or_insert_with(|| DirEntry::new(zid));
    let duplicates = update_entry(entry, name);
    if !duplicates.is_empty() {
        tracing::info!(
            zid = %zid,
            content = %entry.content_name,
            meta = %entry.meta_name,
            passed_over = ?duplicates,
            "duplicate zettel files"
        );
    }
    zid
}

/// Removes `name` from its entry. Returns the zid and whether the entry
/// survives, or `None` when no entry refers to the name.
fn fold_delete(entries: &mut EntrySet, name: &str) -> Option<(Zid, bool)> {
    let zid = seek_zid(name);
    let entry = entries.get_mut(&zid)?;
    delete_from_entry(entry, name);
    if entry.is_live() {
        return Some((zid, true));
    }
    entries.remove(&zid);
    Some((zid, false))
}
