//! Read-only box over a zip archive. The catalog comes from the same
//! [`DirService`] the directory box uses, fed by a [`ZipNotifier`].

use crate::config::ZipBoxConfig;
use crate::dirbox::service::{cleanup_meta, default_meta};
use crate::errors::{StoreError, StoreResult};
use crate::id::Zid;
use crate::meta::{parse_header, Meta};
use crate::notify::{archive_error, open_archive, DirEntry, DirService, ZipNotifier};
use crate::storage::{
    publish, BoxStats, Enricher, StartState, UpdateReason, UpdateSender, ZettelBox, ZidPredicate,
};
use crate::zettel::{Content, Zettel};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use zip::ZipArchive;

pub struct ZipBox {
    origin: Arc<str>,
    config: ZipBoxConfig,
    dir_service: DirService,
    updates: UpdateSender,
    enricher: RwLock<Option<Arc<dyn Enricher>>>,
}

impl ZipBox {
    pub fn new(config: ZipBoxConfig, updates: UpdateSender) -> Self {
        let origin: Arc<str> = Arc::from(config.location());
        Self {
            dir_service: DirService::new(origin.clone(), updates.clone()),
            origin,
            config,
            updates,
            enricher: RwLock::new(None),
        }
    }

    pub fn set_enricher(&self, enricher: Arc<dyn Enricher>) {
        *self.enricher.write() = Some(enricher);
    }

    pub fn config(&self) -> &ZipBoxConfig {
        &self.config
    }

    /// Starts listing the archive. Fails with `NoDirectory` when the archive
    /// file does not exist.
    pub fn start(&self) -> StoreResult<()> {
        let path = &self.config.path;
        if !path.is_file() {
            return Err(StoreError::NoDirectory(path.display().to_string()));
        }
        let (notifier, events) = ZipNotifier::start(path.clone());
        self.dir_service.start(Box::new(notifier), events)?;
        tracing::info!(location = %self.origin, "zip box started");
        Ok(())
    }

    pub fn stop(&self) {
        self.dir_service.stop();
    }

    /// Re-reads the archive listing and tells listeners to re-index.
    pub fn refresh(&self) {
        self.dir_service.refresh();
        publish(&self.updates, &self.origin, UpdateReason::OnReload, Zid::INVALID);
    }

    pub fn dir_service(&self) -> &DirService {
        &self.dir_service
    }

    fn live_entry(&self, zid: Zid) -> StoreResult<DirEntry> {
        match self.dir_service.get_entry(zid) {
            Some(entry) if entry.is_live() => Ok(entry),
            _ => Err(StoreError::NotFound(zid)),
        }
    }

    fn enrich(&self, meta: &mut Meta) {
        let enricher = self.enricher.read().clone();
        if let Some(enricher) = enricher {
            enricher.enrich(meta);
        }
    }
}

#[async_trait]
impl ZettelBox for ZipBox {
    fn location(&self) -> String {
        self.origin.to_string()
    }

    fn state(&self) -> StartState {
        self.dir_service.start_state()
    }

    fn can_create_zettel(&self) -> bool {
        false
    }

    async fn create_zettel(&self, _zettel: Zettel) -> StoreResult<Zid> {
        Err(StoreError::ReadOnly)
    }

    async fn get_zettel(&self, zid: Zid) -> StoreResult<Zettel> {
        let entry = self.live_entry(zid)?;
        let path = self.config.path.clone();
        let (meta, content) = tokio::task::spawn_blocking(move || {
            let mut archive = open_archive(&path)?;
            read_zettel(&mut archive, &path, &entry)
        })
        .await
        .map_err(|error| StoreError::Internal(error.to_string()))??;
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
        let entries: Vec<DirEntry> = self
            .dir_service
            .get_entries(constraint)
            .into_iter()
            .filter(DirEntry::is_live)
            .collect();
        if entries.is_empty() {
            return Ok(());
        }
        let path = self.config.path.clone();
        let metas = tokio::task::spawn_blocking(move || read_all_meta(&path, &entries))
            .await
            .map_err(|error| StoreError::Internal(error.to_string()))??;
        for mut meta in metas {
            self.enrich(&mut meta);
            handle(meta);
        }
        Ok(())
    }

    fn can_update_zettel(&self, _zettel: &Zettel) -> bool {
        false
    }

    async fn update_zettel(&self, _zettel: Zettel) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }

    fn can_rename_zettel(&self, _zid: Zid) -> bool {
        false
    }

    async fn rename_zettel(&self, _cur: Zid, _new: Zid) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }

    fn can_delete_zettel(&self, _zid: Zid) -> bool {
        false
    }

    async fn delete_zettel(&self, _zid: Zid) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }

    fn read_stats(&self) -> BoxStats {
        BoxStats {
            read_only: true,
            zettel_count: self.dir_service.num_entries(),
        }
    }
}

fn read_member(archive: &mut ZipArchive<File>, path: &Path, name: &str) -> StoreResult<Vec<u8>> {
    let mut member = archive
        .by_name(name)
        .map_err(|error| archive_error(path, error))?;
    let mut bytes = Vec::with_capacity(member.size() as usize);
    member
        .read_to_end(&mut bytes)
        .map_err(|error| StoreError::io(format!("read {name} in {}", path.display()), error))?;
    Ok(bytes)
}

fn read_meta(archive: &mut ZipArchive<File>, path: &Path, entry: &DirEntry) -> StoreResult<Meta> {
    let mut meta = if !entry.meta_name.is_empty() {
        parse_header(entry.zid, &read_member(archive, path, &entry.meta_name)?).0
    } else if entry.has_meta_in_content() {
        parse_header(entry.zid, &read_member(archive, path, &entry.content_name)?).0
    } else {
        default_meta(entry.zid, &entry.content_ext)
    };
    cleanup_meta(&mut meta, entry);
    Ok(meta)
}

fn read_zettel(
    archive: &mut ZipArchive<File>,
    path: &Path,
    entry: &DirEntry,
) -> StoreResult<(Meta, Content)> {
    if entry.has_meta_in_content() {
        let bytes = read_member(archive, path, &entry.content_name)?;
        let (mut meta, offset) = parse_header(entry.zid, &bytes);
        cleanup_meta(&mut meta, entry);
        return Ok((meta, Content::new(bytes[offset..].to_vec())));
    }
    let meta = read_meta(archive, path, entry)?;
    let content = if entry.content_name.is_empty() {
        Content::default()
    } else {
        Content::new(read_member(archive, path, &entry.content_name)?)
    };
    Ok((meta, content))
}

/// Metadata of every entry, read through one open archive. Members that are
/// gone since the last listing are skipped.
fn read_all_meta(path: &Path, entries: &[DirEntry]) -> StoreResult<Vec<Meta>> {
    let mut archive = open_archive(path)?;
    let mut metas = Vec::with_capacity(entries.len());
    for entry in entries {
        match read_meta(&mut archive, path, entry) {
            Ok(meta) => metas.push(meta),
            Err(StoreError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(zid = %entry.zid, "zettel vanished from archive");
            }
            Err(error) => return Err(error),
        }
    }
    Ok(metas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::keys::{KEY_SYNTAX, KEY_TITLE, KEY_USELESS_FILES};
    use crate::storage::{update_channel, UpdateReceiver};
    use std::io::Write;
    use std::path::PathBuf;
    use std::time::Duration;

    struct Stamp;

    impl Enricher for Stamp {
        fn enrich(&self, meta: &mut Meta) {
            meta.set("stamped", "yes");
        }
    }

    fn write_archive(path: &Path, members: &[(&str, &str)]) {
        let file = File::create(path).expect("create archive");
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in members {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .expect("start member");
            writer.write_all(body.as_bytes()).expect("write member");
        }
        writer.finish().expect("finish archive");
    }

    async fn started(path: &Path) -> (ZipBox, UpdateReceiver) {
        let (updates, changes) = update_channel();
        let location = format!("zip://{}", path.display());
        let config = ZipBoxConfig::from_url(&location).expect("zip url");
        let zipbox = ZipBox::new(config, updates);
        zipbox.start().expect("start box");
        for _ in 0..500 {
            if zipbox.state() == StartState::Started {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(zipbox.state(), StartState::Started);
        (zipbox, changes)
    }

    fn z(n: u64) -> Zid {
        Zid::from_u64(n)
    }

    fn sample(dir: &Path) -> PathBuf {
        let path = dir.join("box.zip");
        write_archive(
            &path,
            &[
                ("20200101000001.zettel", "title: Packed\n\nzettel body"),
                ("20200101000002.md", "# Heading"),
                ("20200101000002", "title: Markdown\nsyntax: md\n"),
                ("20200101000002 old.md", "stale"),
                ("20200101000003.png", "\u{0}png"),
            ],
        );
        path
    }

    #[tokio::test]
    async fn reads_zettel_from_archive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (zipbox, _changes) = started(&sample(dir.path())).await;

        let packed = zipbox.get_zettel(z(20200101000001)).await.expect("packed");
        assert_eq!(packed.meta.get(KEY_TITLE), Some("Packed"));
        assert_eq!(packed.meta.get(KEY_SYNTAX), Some("zmk"));
        assert_eq!(packed.content.as_bytes(), b"zettel body");

        let markdown = zipbox.get_zettel(z(20200101000002)).await.expect("markdown");
        assert_eq!(markdown.meta.get(KEY_TITLE), Some("Markdown"));
        assert_eq!(markdown.content.as_bytes(), b"# Heading");
        assert_eq!(
            markdown.meta.get(KEY_USELESS_FILES),
            Some("20200101000002 old.md")
        );

        let image = zipbox.get_zettel(z(20200101000003)).await.expect("image");
        assert_eq!(image.meta.get(KEY_TITLE), Some("20200101000003"));
        assert_eq!(image.meta.get(KEY_SYNTAX), Some("png"));
        assert!(image.content.is_binary());

        assert!(matches!(
            zipbox.get_zettel(z(20200101000009)).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(zipbox.read_stats(), BoxStats { read_only: true, zettel_count: 3 });
        zipbox.stop();
    }

    #[tokio::test]
    async fn apply_meta_enriches_filtered_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (zipbox, _changes) = started(&sample(dir.path())).await;
        zipbox.set_enricher(Arc::new(Stamp));

        let mut seen = Vec::new();
        zipbox
            .apply_meta(
                &mut |meta: Meta| seen.push(meta),
                &|zid: Zid| zid != z(20200101000003),
            )
            .await
            .expect("apply meta");
        let zids: Vec<Zid> = seen.iter().map(|meta| meta.zid).collect();
        assert_eq!(zids, vec![z(20200101000001), z(20200101000002)]);
        assert!(seen.iter().all(|meta| meta.get("stamped") == Some("yes")));
        assert_eq!(zipbox.fetch_zids().expect("zids").len(), 3);
        zipbox.stop();
    }

    #[tokio::test]
    async fn mutations_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (zipbox, _changes) = started(&sample(dir.path())).await;
        let zid = z(20200101000001);
        let zettel = zipbox.get_zettel(zid).await.expect("get");

        assert!(!zipbox.can_create_zettel());
        assert!(!zipbox.can_update_zettel(&zettel));
        assert!(!zipbox.can_rename_zettel(zid));
        assert!(!zipbox.can_delete_zettel(zid));
        assert!(matches!(
            zipbox.create_zettel(zettel.clone()).await,
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(zipbox.update_zettel(zettel).await, Err(StoreError::ReadOnly)));
        assert!(matches!(
            zipbox.rename_zettel(zid, z(20200101000004)).await,
            Err(StoreError::ReadOnly)
        ));
        assert!(matches!(zipbox.delete_zettel(zid).await, Err(StoreError::ReadOnly)));
        assert!(zipbox.has_zettel(zid));
        zipbox.stop();
    }

    #[test]
    fn missing_archive_fails_to_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (updates, _changes) = update_channel();
        let config = ZipBoxConfig {
            path: dir.path().join("absent.zip"),
        };
        let zipbox = ZipBox::new(config, updates);
        assert!(matches!(zipbox.start(), Err(StoreError::NoDirectory(_))));
    }
}
