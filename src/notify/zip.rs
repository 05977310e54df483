use super::fetch::is_zettel_file_name;
use super::{event_channel, send_scan, Event, EventReceiver, EventSender, Notifier};
use crate::errors::{StoreError, StoreResult};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use ::zip::result::ZipError;
use ::zip::ZipArchive;

/// Notifier for a read-only zip archive: one scan per start or refresh,
/// never any incremental events.
pub struct ZipNotifier {
    refresh: Arc<Notify>,
    cancel: CancellationToken,
}

impl ZipNotifier {
    pub fn start(path: impl Into<PathBuf>) -> (Self, EventReceiver) {
        let (tx, rx) = event_channel();
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        tokio::spawn(zip_loop(path.into(), tx, refresh.clone(), cancel.clone()));
        (Self { refresh, cancel }, rx)
    }
}

impl Notifier for ZipNotifier {
    fn refresh(&self) {
        self.refresh.notify_one();
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

async fn zip_loop(path: PathBuf, tx: EventSender, refresh: Arc<Notify>, cancel: CancellationToken) {
    loop {
        let archive = path.clone();
        let open = match tokio::task::spawn_blocking(move || list_archive(&archive)).await {
            Ok(Ok(names)) => {
                tracing::debug!(path = %path.display(), files = names.len(), "zip archive listed");
                send_scan(&tx, names)
            }
            Ok(Err(error)) => {
                tracing::error!(error = %error, path = %path.display(), "cannot read zip archive");
                tx.send(Event::Error(error.to_string())).is_ok()
            }
            Err(join_error) => tx.send(Event::Error(join_error.to_string())).is_ok(),
        };
        if !open {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = refresh.notified() => {}
        }
    }
}

/// Top-level zettel file names stored in the archive, sorted.
pub fn list_archive(path: &Path) -> StoreResult<Vec<String>> {
    let archive = open_archive(path)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|name| !name.contains('/'))
        .filter(|name| is_zettel_file_name(name))
        .map(str::to_string)
        .collect();
    names.sort();
    Ok(names)
}

pub(crate) fn open_archive(path: &Path) -> StoreResult<ZipArchive<File>> {
    let file =
        File::open(path).map_err(|error| StoreError::io(format!("open {}", path.display()), error))?;
    ZipArchive::new(file).map_err(|error| archive_error(path, error))
}

/// Maps archive failures onto I/O errors; a missing member reads as
/// `NotFound`.
pub(crate) fn archive_error(path: &Path, error: ZipError) -> StoreError {
    let source = match error {
        ZipError::Io(source) => source,
        ZipError::FileNotFound => {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such archive member")
        }
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    };
    StoreError::io(format!("read archive {}", path.display()), source)
}
