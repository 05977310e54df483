use super::fetch::{is_zettel_file_name, list_dir_entries};
use super::{event_channel, send_scan, Event, EventReceiver, EventSender, Notifier};
use crate::errors::{StoreError, StoreResult};
use ::notify::event::{ModifyKind, RenameMode};
use ::notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

type RawEvent = ::notify::Result<::notify::Event>;

/// Watching notifier: an initial scan followed by filesystem notifications.
/// The parent directory is watched too, so that removal and re-creation of
/// the zettel directory itself is noticed.
pub struct WatchNotifier {
    refresh: Arc<Notify>,
    cancel: CancellationToken,
}

impl WatchNotifier {
    pub fn start(path: impl AsRef<Path>) -> StoreResult<(Self, EventReceiver)> {
        let path = path.as_ref();
        let root = std::fs::canonicalize(path)
            .map_err(|error| StoreError::io(format!("resolve {}", path.display()), error))?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<RawEvent>();
        let mut watcher = ::notify::recommended_watcher(move |event| {
            if raw_tx.send(event).is_err() {
                tracing::debug!("watch event dropped because notifier is closed");
            }
        })
        .map_err(watch_error)?;
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;
        if let Some(parent) = root.parent() {
            if let Err(error) = watcher.watch(parent, RecursiveMode::NonRecursive) {
                tracing::warn!(
                    error = %error,
                    path = %parent.display(),
                    "cannot watch parent directory, removal of the zettel directory may go unnoticed"
                );
            }
        }

        let (tx, rx) = event_channel();
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        tokio::spawn(watch_loop(
            root,
            watcher,
            raw_rx,
            tx,
            refresh.clone(),
            cancel.clone(),
        ));
        Ok((Self { refresh, cancel }, rx))
    }
}

impl Notifier for WatchNotifier {
    fn refresh(&self) {
        self.refresh.notify_one();
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

fn watch_error(error: ::notify::Error) -> StoreError {
    StoreError::io("filesystem watcher", std::io::Error::other(error.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Forward(Event),
    RootGone,
    RootBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Appeared,
    Changed,
    Vanished,
}

async fn watch_loop(
    root: PathBuf,
    mut watcher: RecommendedWatcher,
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    tx: EventSender,
    refresh: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut root_present = scan(&root, &tx).await;
    loop {
        let keep_going = tokio::select! {
            _ = cancel.cancelled() => false,
            _ = refresh.notified() => {
                root_present = scan(&root, &tx).await;
                !tx.is_closed()
            }
            raw = raw_rx.recv() => match raw {
                None => false,
                Some(Err(error)) => {
                    tracing::warn!(error = %error, "filesystem watcher reported an error");
                    tx.send(Event::Error(error.to_string())).is_ok()
                }
                Some(Ok(event)) => {
                    let mut open = true;
                    for action in classify(&root, event) {
                        open = match action {
                            Action::Forward(event) => {
                                tracing::trace!(event = ?event, "watch event");
                                tx.send(event).is_ok()
                            }
                            Action::RootGone if root_present => {
                                root_present = false;
                                let _ = watcher.unwatch(&root);
                                tracing::error!(path = %root.display(), "zettel directory removed");
                                tx.send(Event::Destroy).is_ok()
                            }
                            Action::RootGone => true,
                            Action::RootBack => {
                                if let Err(error) = watcher.watch(&root, RecursiveMode::NonRecursive) {
                                    tracing::warn!(error = %error, path = %root.display(), "cannot watch re-created directory");
                                }
                                root_present = scan(&root, &tx).await;
                                !tx.is_closed()
                            }
                        };
                        if !open {
                            break;
                        }
                    }
                    open
                }
            }
        };
        if !keep_going {
            break;
        }
    }
    drop(watcher);
    tracing::debug!(path = %root.display(), "watching notifier stopped");
}

/// Sends a full scan; returns whether the directory exists.
async fn scan(root: &Path, tx: &EventSender) -> bool {
    let scan_path = root.to_path_buf();
    match tokio::task::spawn_blocking(move || list_dir_entries(&scan_path)).await {
        Ok(Ok(names)) => {
            send_scan(tx, names);
            true
        }
        Ok(Err(StoreError::Io { source, .. })) if source.kind() == std::io::ErrorKind::NotFound => {
            let _ = tx.send(Event::Destroy);
            false
        }
        Ok(Err(error)) => {
            let _ = tx.send(Event::Error(error.to_string()));
            root.is_dir()
        }
        Err(join_error) => {
            let _ = tx.send(Event::Error(join_error.to_string()));
            root.is_dir()
        }
    }
}

fn changes(event: ::notify::Event) -> Vec<(PathBuf, Change)> {
    let ::notify::Event { kind, paths, .. } = event;
    match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut changes = Vec::with_capacity(2);
            if let Some(from) = paths.first() {
                changes.push((from.clone(), Change::Vanished));
            }
            if let Some(to) = paths.get(1) {
                changes.push((to.clone(), Change::Appeared));
            }
            changes
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(|path| (path, Change::Vanished)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(|path| (path, Change::Appeared)).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                let change = if std::fs::symlink_metadata(&path).is_ok() {
                    Change::Appeared
                } else {
                    Change::Vanished
                };
                (path, change)
            })
            .collect(),
        EventKind::Create(_) => paths.into_iter().map(|path| (path, Change::Appeared)).collect(),
        EventKind::Modify(_) => paths.into_iter().map(|path| (path, Change::Changed)).collect(),
        EventKind::Remove(_) => paths.into_iter().map(|path| (path, Change::Vanished)).collect(),
        _ => Vec::new(),
    }
}

fn classify(root: &Path, event: ::notify::Event) -> Vec<Action> {
    let mut actions = Vec::new();
    for (path, change) in changes(event) {
        if path == root {
            match change {
                Change::Vanished => actions.push(Action::RootGone),
                Change::Appeared if path.is_dir() => actions.push(Action::RootBack),
                _ => {}
            }
            continue;
        }
        if path.parent() != Some(root) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !is_zettel_file_name(name) {
            continue;
        }
        match change {
            Change::Vanished => actions.push(Action::Forward(Event::Delete(name.to_string()))),
            Change::Appeared | Change::Changed => match std::fs::metadata(&path) {
                Ok(metadata) if metadata.is_file() => {
                    actions.push(Action::Forward(Event::Update(name.to_string())))
                }
                Ok(_) => {}
                Err(_) => actions.push(Action::Forward(Event::Delete(name.to_string()))),
            },
        }
    }
    actions
}
