use std::time::Duration;
use zettelstore_core::meta::keys::{KEY_SYNTAX, KEY_TITLE, KEY_USELESS_FILES};
use zettelstore_core::{
    update_channel, DirBox, DirBoxConfig, Meta, NotifierKind, StartState, StoreError,
    UpdateReason, UpdateReceiver, Zettel, ZettelBox, Zid,
};

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

async fn wait_for(dirbox: &DirBox, zid: Zid, present: bool) {
    for _ in 0..500 {
        if dirbox.has_zettel(zid) == present {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("zettel {zid} presence never became {present}");
}

#[tokio::test]
async fn initial_scan_folds_files_into_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    std::fs::write(root.join("20200101000001.zettel"), "title: Plain\n\nBody").expect("seed");
    std::fs::write(root.join("20200101000002.md"), "# Markdown").expect("seed");
    std::fs::write(root.join("20200101000002.meta"), "title: With meta\n").expect("seed");
    std::fs::write(root.join("20200101000003 draft.txt"), "text").expect("seed");
    std::fs::write(root.join("20200101000003 copy.txt~"), "backup").expect("seed");
    std::fs::write(root.join("notes.txt"), "ignored").expect("seed");

    let mut config = DirBoxConfig::new(root);
    config.notifier = NotifierKind::Simple;
    let (dirbox, _changes) = started(config).await;

    let zids = dirbox.fetch_zids().expect("zids");
    assert_eq!(zids.len(), 3);

    let md = dirbox.get_zettel(Zid::from_u64(20200101000002)).await.expect("md zettel");
    assert_eq!(md.meta.get(KEY_TITLE), Some("With meta"));
    assert_eq!(md.meta.get(KEY_SYNTAX), Some("md"));
    assert_eq!(md.content.as_bytes(), b"# Markdown");

    let txt = dirbox.get_zettel(Zid::from_u64(20200101000003)).await.expect("txt zettel");
    assert_eq!(txt.meta.get(KEY_SYNTAX), Some("plain"));
    assert_eq!(txt.meta.get(KEY_TITLE), Some("20200101000003"));
    assert_eq!(txt.meta.get(KEY_USELESS_FILES), None);
    dirbox.stop();
}

#[tokio::test]
async fn watcher_sees_external_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = DirBoxConfig::new(dir.path());
    config.notifier = NotifierKind::Notify;
    let (dirbox, _changes) = started(config).await;

    let zid = Zid::from_u64(20210101000000);
    let path = dir.path().join("20210101000000.zettel");
    std::fs::write(&path, "title: External\n\nwritten by hand").expect("write");
    wait_for(&dirbox, zid, true).await;
    let zettel = dirbox.get_zettel(zid).await.expect("get");
    assert_eq!(zettel.meta.get(KEY_TITLE), Some("External"));

    std::fs::remove_file(&path).expect("remove");
    wait_for(&dirbox, zid, false).await;
    assert!(matches!(dirbox.get_zettel(zid).await, Err(StoreError::NotFound(_))));
    dirbox.stop();
}

#[tokio::test]
async fn full_lifecycle_publishes_ordered_changes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = DirBoxConfig::new(dir.path());
    config.notifier = NotifierKind::Simple;
    config.poll_interval_ms = 3_600_000;
    let (dirbox, mut changes) = started(config).await;

    let mut meta = Meta::new(Zid::INVALID);
    meta.set(KEY_TITLE, "Lifecycle");
    let zid = dirbox
        .create_zettel(Zettel::new(meta, "v1"))
        .await
        .expect("create");

    let mut zettel = dirbox.get_zettel(zid).await.expect("get");
    zettel.content = "v2".into();
    dirbox.update_zettel(zettel).await.expect("update");
    assert_eq!(
        dirbox.get_zettel(zid).await.expect("reread").content.as_bytes(),
        b"v2"
    );
    dirbox.delete_zettel(zid).await.expect("delete");

    let mut seen = Vec::new();
    while seen.len() < 3 {
        let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("change in time")
            .expect("channel open");
        if change.zid == zid {
            seen.push(change.reason);
        }
    }
    assert_eq!(
        seen,
        vec![UpdateReason::OnZettel, UpdateReason::OnZettel, UpdateReason::OnDelete]
    );
    dirbox.stop();
}
