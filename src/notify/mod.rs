//! Filesystem notifiers and the directory service that folds their events
//! into a catalog of [`DirEntry`] records.

mod directory;
mod entry;
mod fetch;
mod simple;
mod watch;
mod zip;

pub use directory::{DirService, DirServiceState};
pub use entry::{delete_from_entry, only_ext, syntax_from_ext, update_entry, DirEntry, EXT_META, EXT_ZETTEL};
pub use fetch::{is_zettel_file_name, list_dir_entries};
pub use simple::SimpleNotifier;
pub use watch::WatchNotifier;
pub use self::zip::{list_archive, ZipNotifier};
pub(crate) use self::zip::{archive_error, open_archive};

use tokio::sync::mpsc;

/// Normalized notifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A scan has begun; the catalog under construction starts empty.
    Make,
    /// One file seen during a scan. An empty name ends the scan.
    List(String),
    Update(String),
    Delete(String),
    /// The observed directory itself vanished.
    Destroy,
    Error(String),
    /// Initial scan finished; treated like `List("")`.
    Ready,
}

impl Event {
    pub fn end_of_scan() -> Self {
        Event::List(String::new())
    }
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

pub(crate) fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Handle to a running notifier. Dropping the handle does not stop it; call
/// [`Notifier::close`], after which the event channel eventually closes.
pub trait Notifier: Send + Sync {
    /// Requests a fresh full scan.
    fn refresh(&self);
    fn close(&self);
}

/// Emits a complete scan: `Make`, one `List` per name, then `List("")`.
/// Returns false once the receiving side is gone.
pub(crate) fn send_scan(tx: &EventSender, names: Vec<String>) -> bool {
    if tx.send(Event::Make).is_err() {
        return false;
    }
    for name in names {
        if tx.send(Event::List(name)).is_err() {
            return false;
        }
    }
    tx.send(Event::end_of_scan()).is_ok()
}
