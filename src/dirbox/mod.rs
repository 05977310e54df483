//! Directory-backed box: a [`DirService`] catalog plus a pool of file
//! workers, exposed through the [`ZettelBox`] contract.

pub mod service;

use crate::config::{DirBoxConfig, NotifierKind};
use crate::errors::{StoreError, StoreResult};
use crate::id::Zid;
use crate::meta::Meta;
use crate::notify::{
    DirEntry, DirService, EventReceiver, Notifier, SimpleNotifier, WatchNotifier,
};
use crate::storage::{
    publish, BoxStats, Enricher, StartState, UpdateReason, UpdateSender, ZettelBox, ZidPredicate,
};
use crate::zettel::Zettel;
use async_trait::async_trait;
use parking_lot::RwLock;
use service::FileService;
use std::sync::Arc;

pub struct DirBox {
    origin: Arc<str>,
    config: DirBoxConfig,
    dir_service: DirService,
    files: RwLock<Option<Arc<FileService>>>,
    updates: UpdateSender,
    enricher: RwLock<Option<Arc<dyn Enricher>>>,
}

impl DirBox {
    pub fn new(config: DirBoxConfig, updates: UpdateSender) -> Self {
        let origin: Arc<str> = Arc::from(config.location());
        Self {
            dir_service: DirService::new(origin.clone(), updates.clone()),
            origin,
            config,
            files: RwLock::new(None),
            updates,
            enricher: RwLock::new(None),
        }
    }

    /// Metadata returned by `apply_meta` passes through `enricher` first.
    pub fn set_enricher(&self, enricher: Arc<dyn Enricher>) {
        *self.enricher.write() = Some(enricher);
    }

    pub fn config(&self) -> &DirBoxConfig {
        &self.config
    }

    /// Starts notifier, directory service and file workers. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) -> StoreResult<()> {
        let path = &self.config.path;
        if !path.is_dir() {
            if self.config.readonly {
                return Err(StoreError::NoDirectory(path.display().to_string()));
            }
            std::fs::create_dir_all(path)
                .map_err(|error| StoreError::io(format!("create {}", path.display()), error))?;
        }

        let (notifier, events): (Box<dyn Notifier>, EventReceiver) = match self.config.notifier {
            NotifierKind::Notify => {
                let (notifier, events) = WatchNotifier::start(path)?;
                (Box::new(notifier), events)
            }
            NotifierKind::Simple => {
                let (notifier, events) = SimpleNotifier::start(path, self.config.poll_interval());
                (Box::new(notifier), events)
            }
        };
        let files = FileService::start(
            path.clone(),
            self.config.worker_count(),
            self.config.service_timeout(),
        );
        *self.files.write() = Some(Arc::new(files));
        self.dir_service.start(notifier, events)?;
        tracing::info!(
            location = %self.origin,
            notifier = self.config.notifier.as_str(),
            workers = self.config.worker_count(),
            readonly = self.config.readonly,
            "directory box started"
        );
        Ok(())
    }

    pub fn stop(&self) {
        self.dir_service.stop();
        if let Some(files) = self.files.write().take() {
            files.stop();
        }
    }

    /// Forces a re-scan of the directory and tells listeners to re-index.
    pub fn refresh(&self) {
        self.dir_service.refresh();
        publish(&self.updates, &self.origin, UpdateReason::OnReload, Zid::INVALID);
    }

    pub fn dir_service(&self) -> &DirService {
        &self.dir_service
    }

    fn files(&self) -> StoreResult<Arc<FileService>> {
        self.files
            .read()
            .clone()
            .ok_or_else(|| StoreError::Stopped(format!("box {} is not started", self.origin)))
    }

    fn live_entry(&self, zid: Zid) -> StoreResult<DirEntry> {
        match self.dir_service.get_entry(zid) {
            Some(entry) if entry.is_live() => Ok(entry),
            _ => Err(StoreError::NotFound(zid)),
        }
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.config.readonly {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn enrich(&self, meta: &mut Meta) {
        let enricher = self.enricher.read().clone();
        if let Some(enricher) = enricher {
            enricher.enrich(meta);
        }
    }
}

#[async_trait]
impl ZettelBox for DirBox {
    fn location(&self) -> String {
        self.origin.to_string()
    }

    fn state(&self) -> StartState {
        self.dir_service.start_state()
    }

    fn can_create_zettel(&self) -> bool {
        !self.config.readonly
    }

    async fn create_zettel(&self, zettel: Zettel) -> StoreResult<Zid> {
        self.ensure_writable()?;
        let files = self.files()?;
        let zid = self.dir_service.set_new_dir_entry()?;
        let Zettel { mut meta, content } = zettel;
        meta.zid = zid;

        let mut entry = DirEntry::new(zid);
        entry.setup_from_meta(&meta, &self.config.zettel_file_syntax);
        if let Err(error) = files.set_zettel(&entry, Zettel::new(meta, content)).await {
            self.dir_service.delete_dir_entry(zid)?;
            return Err(error);
        }
        self.dir_service.update_dir_entry(entry)?;
        publish(&self.updates, &self.origin, UpdateReason::OnZettel, zid);
        tracing::debug!(zid = %zid, location = %self.origin, "zettel created");
        Ok(zid)
    }

    async fn get_zettel(&self, zid: Zid) -> StoreResult<Zettel> {
        let entry = self.live_entry(zid)?;
        let (meta, content) = self.files()?.get_meta_content(&entry).await?;
        Ok(Zettel::new(meta, content))
    }

    fn has_zettel(&self, zid: Zid) -> bool {
        self.dir_service
            .get_entry(zid)
            .is_some_and(|entry| entry.is_live())
    }

    fn apply_zid(
        &self,
        handle: &mut (dyn FnMut(Zid) + Send),
        constraint: ZidPredicate<'_>,
    ) -> StoreResult<()> {
        for entry in self.dir_service.get_entries(constraint) {
            if entry.is_live() {
                handle(entry.zid);
            }
        }
        Ok(())
    }

    async fn apply_meta(
        &self,
        handle: &mut (dyn FnMut(Meta) + Send),
        constraint: ZidPredicate<'_>,
    ) -> StoreResult<()> {
        let files = self.files()?;
        for entry in self.dir_service.get_entries(constraint) {
            if !entry.is_live() {
                continue;
            }
            let mut meta = match files.get_meta(&entry).await {
                Ok(meta) => meta,
                Err(StoreError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    tracing::debug!(zid = %entry.zid, "zettel vanished while listing");
                    continue;
                }
                Err(error) => return Err(error),
            };
            self.enrich(&mut meta);
            handle(meta);
        }
        Ok(())
    }

    fn can_update_zettel(&self, zettel: &Zettel) -> bool {
        !self.config.readonly && zettel.zid().is_valid()
    }

    async fn update_zettel(&self, zettel: Zettel) -> StoreResult<()> {
        self.ensure_writable()?;
        let zid = zettel.zid();
        if !zid.is_valid() {
            return Err(StoreError::InvalidZid(zid.to_string()));
        }
        let files = self.files()?;
        let mut entry = self
            .dir_service
            .get_entry(zid)
            .unwrap_or_else(|| DirEntry::new(zid));
        entry.setup_from_meta(&zettel.meta, &self.config.zettel_file_syntax);
        files.set_zettel(&entry, zettel).await?;
        self.dir_service.update_dir_entry(entry)?;
        publish(&self.updates, &self.origin, UpdateReason::OnZettel, zid);
        Ok(())
    }

    fn can_rename_zettel(&self, zid: Zid) -> bool {
        !self.config.readonly && self.has_zettel(zid)
    }

    async fn rename_zettel(&self, cur: Zid, new: Zid) -> StoreResult<()> {
        self.ensure_writable()?;
        if cur == new {
            return Ok(());
        }
        if !new.is_valid() {
            return Err(StoreError::InvalidZid(new.to_string()));
        }
        let files = self.files()?;
        let old_entry = self.live_entry(cur)?;
        let (mut meta, content) = files.get_meta_content(&old_entry).await?;
        let new_entry = self.dir_service.rename_dir_entry(&old_entry, new)?;
        meta.zid = new;
        if let Err(error) = files.set_zettel(&new_entry, Zettel::new(meta, content)).await {
            self.dir_service.delete_dir_entry(new)?;
            self.dir_service.update_dir_entry(old_entry)?;
            return Err(error);
        }
        let removed = files.delete_zettel(&old_entry).await;
        publish(&self.updates, &self.origin, UpdateReason::OnDelete, cur);
        publish(&self.updates, &self.origin, UpdateReason::OnZettel, new);
        removed
    }

    fn can_delete_zettel(&self, zid: Zid) -> bool {
        !self.config.readonly && self.has_zettel(zid)
    }

    async fn delete_zettel(&self, zid: Zid) -> StoreResult<()> {
        self.ensure_writable()?;
        let files = self.files()?;
        let entry = self.live_entry(zid)?;
        self.dir_service.delete_dir_entry(zid)?;
        if let Err(error) = files.delete_zettel(&entry).await {
            self.dir_service.update_dir_entry(entry)?;
            return Err(error);
        }
        publish(&self.updates, &self.origin, UpdateReason::OnDelete, zid);
        Ok(())
    }

    fn read_stats(&self) -> BoxStats {
        BoxStats {
            read_only: self.config.readonly,
            zettel_count: self.dir_service.num_entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::keys::{KEY_SYNTAX, KEY_TITLE};
    use crate::storage::{update_channel, UpdateInfo, UpdateReceiver};
    use std::time::Duration;

    fn simple_config(path: &std::path::Path) -> DirBoxConfig {
        let mut config = DirBoxConfig::new(path);
        config.notifier = NotifierKind::Simple;
        config.poll_interval_ms = 3_600_000;
        config.workers = 2;
        config
    }

    async fn started(config: DirBoxConfig) -> (DirBox, UpdateReceiver) {
        let (updates, changes) = update_channel();
        let dirbox = DirBox::new(config, updates);
        dirbox.start().expect("start box");
        for _ in 0..500 {
            if dirbox.state() == StartState::Started {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dirbox.state(), StartState::Started);
        (dirbox, changes)
    }

    async fn next_change(rx: &mut UpdateReceiver) -> UpdateInfo {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("change in time")
            .expect("channel open")
    }

    fn titled(title: &str) -> Zettel {
        let mut meta = Meta::new(Zid::INVALID);
        meta.set(KEY_TITLE, title);
        Zettel::new(meta, "content")
    }

    #[tokio::test]
    async fn create_get_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (dirbox, mut changes) = started(simple_config(dir.path())).await;

        let zid = dirbox.create_zettel(titled("First")).await.expect("create");
        let change = next_change(&mut changes).await;
        assert_eq!((change.zid, change.reason), (zid, UpdateReason::OnZettel));
        assert!(dir.path().join(format!("{zid}.zettel")).is_file());
        assert!(dirbox.has_zettel(zid));

        let zettel = dirbox.get_zettel(zid).await.expect("get");
        assert_eq!(zettel.meta.get(KEY_TITLE), Some("First"));
        assert_eq!(zettel.content.as_bytes(), b"content");
        assert_eq!(dirbox.read_stats().zettel_count, 1);

        dirbox.delete_zettel(zid).await.expect("delete");
        let change = next_change(&mut changes).await;
        assert_eq!((change.zid, change.reason), (zid, UpdateReason::OnDelete));
        assert!(!dir.path().join(format!("{zid}.zettel")).exists());
        assert!(matches!(
            dirbox.delete_zettel(zid).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(dirbox.get_zettel(zid).await, Err(StoreError::NotFound(_))));
        dirbox.stop();
    }

    #[tokio::test]
    async fn update_unknown_zid_materializes_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (dirbox, mut changes) = started(simple_config(dir.path())).await;
        let zid = Zid::from_u64(20200310195100);
        let mut zettel = titled("Markdown");
        zettel.meta.zid = zid;
        zettel.meta.set(KEY_SYNTAX, "md");

        dirbox.update_zettel(zettel).await.expect("update");
        assert_eq!(next_change(&mut changes).await.zid, zid);
        assert!(dir.path().join("20200310195100.md").is_file());
        assert!(dir.path().join("20200310195100").is_file());

        let entry = dirbox.dir_service().get_entry(zid).expect("entry");
        assert_eq!(entry.meta_name, "20200310195100");
        let read = dirbox.get_zettel(zid).await.expect("get");
        assert_eq!(read.meta.get(KEY_SYNTAX), Some("md"));
        dirbox.stop();
    }

    #[tokio::test]
    async fn rename_moves_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (dirbox, mut changes) = started(simple_config(dir.path())).await;
        let cur = dirbox.create_zettel(titled("Move me")).await.expect("create");
        next_change(&mut changes).await;

        let new = Zid::from_u64(20010101000000);
        dirbox.rename_zettel(cur, new).await.expect("rename");
        let first = next_change(&mut changes).await;
        let second = next_change(&mut changes).await;
        assert_eq!((first.zid, first.reason), (cur, UpdateReason::OnDelete));
        assert_eq!((second.zid, second.reason), (new, UpdateReason::OnZettel));
        assert!(!dir.path().join(format!("{cur}.zettel")).exists());
        let moved = dirbox.get_zettel(new).await.expect("renamed zettel");
        assert_eq!(moved.meta.get(KEY_TITLE), Some("Move me"));
        assert_eq!(moved.zid(), new);

        let other = dirbox.create_zettel(titled("Other")).await.expect("create");
        assert!(matches!(
            dirbox.rename_zettel(other, new).await,
            Err(StoreError::InvalidZid(_))
        ));
        dirbox.stop();
    }

    #[tokio::test]
    async fn readonly_box_refuses_mutation() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("20200310195100.zettel"), "title: Kept\n\nbody")
            .expect("seed");
        let mut config = simple_config(dir.path());
        config.readonly = true;
        let (dirbox, _changes) = started(config).await;

        assert!(!dirbox.can_create_zettel());
        assert!(matches!(
            dirbox.create_zettel(titled("x")).await,
            Err(StoreError::ReadOnly)
        ));
        let zid = Zid::from_u64(20200310195100);
        assert!(!dirbox.can_delete_zettel(zid));
        assert!(matches!(dirbox.delete_zettel(zid).await, Err(StoreError::ReadOnly)));
        assert!(dirbox.read_stats().read_only);

        let mut titles = Vec::new();
        dirbox
            .apply_meta(
                &mut |meta: Meta| titles.push(meta.get(KEY_TITLE).unwrap_or_default().to_string()),
                &|_: Zid| true,
            )
            .await
            .expect("apply meta");
        assert_eq!(titles, vec!["Kept".to_string()]);
        assert_eq!(dirbox.fetch_zids().expect("zids").len(), 1);
        dirbox.stop();
    }

    #[tokio::test]
    async fn readonly_box_needs_existing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = simple_config(&dir.path().join("absent"));
        config.readonly = true;
        let (updates, _changes) = update_channel();
        let dirbox = DirBox::new(config, updates);
        assert!(matches!(dirbox.start(), Err(StoreError::NoDirectory(_))));
        assert_eq!(dirbox.state(), StartState::Stopped);
    }

    #[tokio::test]
    async fn refresh_publishes_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (dirbox, mut changes) = started(simple_config(dir.path())).await;
        dirbox.refresh();
        let change = next_change(&mut changes).await;
        assert_eq!(change.reason, UpdateReason::OnReload);
        assert!(!change.zid.is_valid());
        dirbox.stop();
    }
}
