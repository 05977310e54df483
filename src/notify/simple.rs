use super::fetch::list_dir_entries;
use super::{event_channel, send_scan, Event, EventReceiver, EventSender, Notifier};
use crate::errors::StoreError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Polling notifier: re-enumerates the directory every `interval` and on
/// every refresh request.
pub struct SimpleNotifier {
    refresh: Arc<Notify>,
    cancel: CancellationToken,
}

impl SimpleNotifier {
    pub fn start(path: impl Into<PathBuf>, interval: Duration) -> (Self, EventReceiver) {
        let (tx, rx) = event_channel();
        let refresh = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        tokio::spawn(poll_loop(
            path.into(),
            interval,
            tx,
            refresh.clone(),
            cancel.clone(),
        ));
        (Self { refresh, cancel }, rx)
    }
}

impl Notifier for SimpleNotifier {
    fn refresh(&self) {
        self.refresh.notify_one();
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    path: PathBuf,
    interval: Duration,
    tx: EventSender,
    refresh: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut missing = false;
    loop {
        let scan_path = path.clone();
        let listing = tokio::task::spawn_blocking(move || list_dir_entries(&scan_path)).await;
        let keep_going = match listing {
            Ok(Ok(names)) => {
                missing = false;
                tracing::trace!(path = %path.display(), files = names.len(), "directory polled");
                send_scan(&tx, names)
            }
            Ok(Err(StoreError::Io { source, .. }))
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                if missing {
                    true
                } else {
                    missing = true;
                    tracing::error!(path = %path.display(), "zettel directory missing");
                    tx.send(Event::Destroy).is_ok()
                }
            }
            Ok(Err(error)) => tx.send(Event::Error(error.to_string())).is_ok(),
            Err(join_error) => tx.send(Event::Error(join_error.to_string())).is_ok(),
        };
        if !keep_going {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = refresh.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::debug!(path = %path.display(), "polling notifier stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next(rx: &mut EventReceiver) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn scans_on_start_and_refresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("20200310195100.zettel"), "x").expect("write");

        let (notifier, mut rx) = SimpleNotifier::start(dir.path(), Duration::from_secs(3600));
        assert_eq!(next(&mut rx).await, Event::Make);
        assert_eq!(
            next(&mut rx).await,
            Event::List("20200310195100.zettel".to_string())
        );
        assert_eq!(next(&mut rx).await, Event::end_of_scan());

        std::fs::write(dir.path().join("20200310195101.md"), "y").expect("write");
        notifier.refresh();
        assert_eq!(next(&mut rx).await, Event::Make);
        assert_eq!(
            next(&mut rx).await,
            Event::List("20200310195100.zettel".to_string())
        );
        assert_eq!(next(&mut rx).await, Event::List("20200310195101.md".to_string()));
        assert_eq!(next(&mut rx).await, Event::end_of_scan());

        notifier.close();
        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("channel closes");
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn missing_directory_reports_destroy_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("zettel");
        let (notifier, mut rx) = SimpleNotifier::start(&missing, Duration::from_millis(20));
        assert_eq!(next(&mut rx).await, Event::Destroy);

        std::fs::create_dir(&missing).expect("mkdir");
        assert_eq!(next(&mut rx).await, Event::Make);
        assert_eq!(next(&mut rx).await, Event::end_of_scan());
        notifier.close();
    }
}
