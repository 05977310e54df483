use std::io::Write;
use std::time::Duration;
use zettelstore_core::meta::keys::{KEY_BACKWARD, KEY_FORWARD};
use zettelstore_core::notify::{list_archive, DirService, DirServiceState, ZipNotifier};
use zettelstore_core::{
    open_zip_store, update_channel, Enricher, IndexerConfig, Meta, StartState, StoreError,
    UpdateReason, ZettelBox, Zid, ZipBoxConfig,
};

fn write_archive(path: &std::path::Path, names: &[&str]) {
    let file = std::fs::File::create(path).expect("create archive");
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for name in names {
        archive.start_file(*name, options).expect("start file");
        archive.write_all(b"title: Zipped\n").expect("write file");
    }
    archive.finish().expect("finish archive");
}

#[tokio::test]
async fn archive_scan_populates_catalog() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("box.zip");
    write_archive(
        &path,
        &[
            "20200101000001.zettel",
            "20200101000002.md",
            "20200101000002.meta",
            "nested/20200101000003.zettel",
            "readme.txt",
        ],
    );
    let location = format!("zip://{}", path.display());
    let config = ZipBoxConfig::from_url(&location).expect("zip url");
    assert_eq!(
        list_archive(&config.path).expect("list"),
        vec!["20200101000001.zettel", "20200101000002.md", "20200101000002.meta"]
    );

    let (updates, mut changes) = update_channel();
    let service = DirService::new(location, updates);
    let (notifier, events) = ZipNotifier::start(config.path.clone());
    service.start(Box::new(notifier), events).expect("start service");

    let mut announced = Vec::new();
    while announced.len() < 2 {
        let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("change in time")
            .expect("channel open");
        assert_eq!(change.reason, UpdateReason::OnZettel);
        announced.push(change.zid);
    }
    announced.sort();
    assert_eq!(
        announced,
        vec![Zid::from_u64(20200101000001), Zid::from_u64(20200101000002)]
    );
    assert_eq!(service.state(), DirServiceState::Working);

    let entry = service
        .get_entry(Zid::from_u64(20200101000002))
        .expect("entry");
    assert_eq!(entry.meta_name, "20200101000002.meta");
    assert_eq!(entry.content_name, "20200101000002.md");
    assert_eq!(service.num_entries(), 2);
    service.stop();
}

#[tokio::test]
async fn zip_store_is_indexed_and_read_only() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("linked.zip");
    let file = std::fs::File::create(&path).expect("create archive");
    let mut archive = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    archive
        .start_file("20200101000001.zettel", options)
        .expect("start file");
    archive
        .write_all(b"title: Source\n\nsee [[20200101000002]]")
        .expect("write file");
    archive
        .start_file("20200101000002.zettel", options)
        .expect("start file");
    archive.write_all(b"title: Target\n\nend").expect("write file");
    archive.finish().expect("finish archive");

    let config = ZipBoxConfig::from_url(&format!("zip://{}", path.display())).expect("zip url");
    let indexer_config = IndexerConfig {
        idle_wait_ms: 20,
        ..IndexerConfig::default()
    };
    let (zipbox, indexer, changes) = open_zip_store(config, indexer_config);
    zipbox.start().expect("start box");
    indexer.start(changes).expect("start indexer");

    let source = Zid::from_u64(20200101000001);
    let target = Zid::from_u64(20200101000002);
    let mut backward = None;
    for _ in 0..300 {
        let mut found = None;
        zipbox
            .apply_meta(&mut |meta: Meta| found = Some(meta), &|zid: Zid| zid == target)
            .await
            .expect("apply meta");
        backward = found.and_then(|meta| meta.get(KEY_BACKWARD).map(str::to_string));
        if backward.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(zipbox.state(), StartState::Started);
    assert_eq!(backward.as_deref(), Some("20200101000001"));

    let zettel = zipbox.get_zettel(source).await.expect("get source");
    assert_eq!(zettel.content.as_bytes(), b"see [[20200101000002]]");
    assert!(matches!(
        zipbox.delete_zettel(source).await,
        Err(StoreError::ReadOnly)
    ));
    let mut meta = Meta::new(source);
    indexer.store().enrich(&mut meta);
    assert_eq!(meta.get(KEY_FORWARD), Some("20200101000002"));

    indexer.stop();
    zipbox.stop();
}
