pub mod anteroom;
pub mod config;
pub mod dirbox;
pub mod errors;
pub mod id;
pub mod index;
pub mod meta;
pub mod notify;
pub mod storage;
pub mod supervise;
pub mod zettel;
pub mod zipbox;

pub use crate::anteroom::{Anteroom, ArAction};
pub use crate::config::{DirBoxConfig, IndexerConfig, NotifierKind, ZipBoxConfig};
pub use crate::dirbox::DirBox;
pub use crate::errors::{StoreError, StoreResult};
pub use crate::id::{Zid, ZidError, ZidSet, ZidSlice};
pub use crate::index::{Indexer, IndexerStats, MemStore, ZettelIndex};
pub use crate::meta::Meta;
pub use crate::storage::{
    update_channel, BoxStats, Enricher, StartState, UpdateInfo, UpdateReason, UpdateReceiver,
    UpdateSender, ZettelBox,
};
pub use crate::zettel::{Content, Zettel};
pub use crate::zipbox::ZipBox;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs a JSON subscriber writing to a daily rolling file below
/// `log_dir`. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing(log_dir: &Path) -> StoreResult<()> {
    std::fs::create_dir_all(log_dir)
        .map_err(|error| StoreError::io(format!("create {}", log_dir.display()), error))?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "zettelstore.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| StoreError::Internal(error.to_string()))
}

/// Plain subscriber on stderr. Fails if a global subscriber is already set.
pub fn init_stderr_tracing() -> StoreResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| StoreError::Internal(error.to_string()))
}

/// Opens a directory box together with an indexer that enriches its
/// metadata. Neither is started.
pub fn open_dir_store(
    config: DirBoxConfig,
    indexer_config: IndexerConfig,
) -> (std::sync::Arc<DirBox>, Indexer, UpdateReceiver) {
    let (updates, receiver) = update_channel();
    let dirbox = std::sync::Arc::new(DirBox::new(config, updates));
    let store = std::sync::Arc::new(MemStore::new());
    dirbox.set_enricher(store.clone());
    let indexer = Indexer::new(dirbox.clone(), store, indexer_config);
    (dirbox, indexer, receiver)
}

/// Opens a read-only zip box with an indexer over its contents. Neither is
/// started.
pub fn open_zip_store(
    config: ZipBoxConfig,
    indexer_config: IndexerConfig,
) -> (std::sync::Arc<ZipBox>, Indexer, UpdateReceiver) {
    let (updates, receiver) = update_channel();
    let zipbox = std::sync::Arc::new(ZipBox::new(config, updates));
    let store = std::sync::Arc::new(MemStore::new());
    zipbox.set_enricher(store.clone());
    let indexer = Indexer::new(zipbox.clone(), store, indexer_config);
    (zipbox, indexer, receiver)
}
