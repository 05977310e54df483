use crate::errors::{StoreError, StoreResult};
use crate::id::Zid;
use crate::meta::keys::{KEY_SYNTAX, KEY_TITLE, KEY_USELESS_FILES};
use crate::meta::{parse_header, write_header, write_zettel_file, Meta, DEFAULT_SYNTAX};
use crate::notify::{syntax_from_ext, DirEntry};
use crate::supervise::{spawn_supervised, RestartPolicy};
use crate::zettel::{Content, Zettel};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 1499;
pub const DEFAULT_WORKERS: usize = 7;

pub fn is_prime(n: usize) -> bool {
    if n == 0 {
        return false;
    }
    if n <= 3 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut divisor = 3;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            return false;
        }
        divisor += 2;
    }
    true
}

/// Smallest prime that is not less than `n`.
pub fn make_prime(n: usize) -> usize {
    let mut candidate = n;
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

/// FNV-1a over the two 32-bit halves of the identifier.
pub fn worker_index(zid: Zid, workers: usize) -> usize {
    let value = zid.as_u64();
    let mut sum: u32 = 2_166_136_261 ^ (value as u32);
    sum = sum.wrapping_mul(16_777_619);
    sum ^= (value >> 32) as u32;
    sum = sum.wrapping_mul(16_777_619);
    sum as usize % workers.max(1)
}

enum FileCommand {
    GetMeta {
        entry: DirEntry,
        reply: oneshot::Sender<StoreResult<Meta>>,
    },
    GetMetaContent {
        entry: DirEntry,
        reply: oneshot::Sender<StoreResult<(Meta, Content)>>,
    },
    SetZettel {
        entry: DirEntry,
        zettel: Zettel,
        reply: oneshot::Sender<StoreResult<()>>,
    },
    DeleteZettel {
        entry: DirEntry,
        reply: oneshot::Sender<StoreResult<()>>,
    },
}

impl FileCommand {
    fn zid(&self) -> Zid {
        match self {
            FileCommand::GetMeta { entry, .. }
            | FileCommand::GetMetaContent { entry, .. }
            | FileCommand::SetZettel { entry, .. }
            | FileCommand::DeleteZettel { entry, .. } => entry.zid,
        }
    }

    async fn run(self, dir: &Path) {
        // A send error only means the caller gave up waiting.
        match self {
            FileCommand::GetMeta { entry, reply } => {
                let _ = reply.send(read_meta(dir, &entry).await);
            }
            FileCommand::GetMetaContent { entry, reply } => {
                let _ = reply.send(read_meta_content(dir, &entry).await);
            }
            FileCommand::SetZettel {
                entry,
                zettel,
                reply,
            } => {
                let _ = reply.send(write_zettel(dir, &entry, &zettel).await);
            }
            FileCommand::DeleteZettel { entry, reply } => {
                let _ = reply.send(delete_files(dir, &entry).await);
            }
        }
    }
}

/// Pool of file workers. Commands for one zid always reach the same worker,
/// so operations on a single zettel are serialized.
pub struct FileService {
    dir: Arc<PathBuf>,
    workers: Vec<mpsc::UnboundedSender<FileCommand>>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl FileService {
    pub fn start(dir: impl Into<PathBuf>, workers: usize, timeout: Duration) -> Self {
        let dir = Arc::new(dir.into());
        let count = make_prime(workers.clamp(MIN_WORKERS, MAX_WORKERS));
        let cancel = CancellationToken::new();
        let mut senders = Vec::with_capacity(count);
        for number in 0..count {
            let (tx, rx) = mpsc::unbounded_channel();
            let rx = Arc::new(Mutex::new(rx));
            let worker_dir = dir.clone();
            let worker_cancel = cancel.clone();
            spawn_supervised(
                format!("file worker {number}"),
                cancel.clone(),
                RestartPolicy::default(),
                move || worker_loop(worker_dir.clone(), rx.clone(), worker_cancel.clone()),
            );
            senders.push(tx);
        }
        tracing::debug!(dir = %dir.display(), workers = count, "file service started");
        Self {
            dir,
            workers: senders,
            timeout,
            cancel,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    async fn submit<T>(
        &self,
        command: FileCommand,
        reply: oneshot::Receiver<StoreResult<T>>,
        operation: &str,
    ) -> StoreResult<T> {
        let zid = command.zid();
        let worker = &self.workers[worker_index(zid, self.workers.len())];
        if worker.send(command).is_err() {
            return Err(StoreError::Stopped(format!("file worker for {zid} is gone")));
        }
        match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StoreError::Stopped(format!(
                "file worker dropped {operation} for {zid}"
            ))),
            Err(_) => {
                tracing::warn!(zid = %zid, operation, timeout = ?self.timeout, "file operation timed out");
                Err(StoreError::Timeout(format!("{operation} for {zid}")))
            }
        }
    }

    pub async fn get_meta(&self, entry: &DirEntry) -> StoreResult<Meta> {
        let (reply, rx) = oneshot::channel();
        let command = FileCommand::GetMeta {
            entry: entry.clone(),
            reply,
        };
        self.submit(command, rx, "get meta").await
    }

    pub async fn get_meta_content(&self, entry: &DirEntry) -> StoreResult<(Meta, Content)> {
        let (reply, rx) = oneshot::channel();
        let command = FileCommand::GetMetaContent {
            entry: entry.clone(),
            reply,
        };
        self.submit(command, rx, "get zettel").await
    }

    pub async fn set_zettel(&self, entry: &DirEntry, zettel: Zettel) -> StoreResult<()> {
        let (reply, rx) = oneshot::channel();
        let command = FileCommand::SetZettel {
            entry: entry.clone(),
            zettel,
            reply,
        };
        self.submit(command, rx, "set zettel").await
    }

    pub async fn delete_zettel(&self, entry: &DirEntry) -> StoreResult<()> {
        let (reply, rx) = oneshot::channel();
        let command = FileCommand::DeleteZettel {
            entry: entry.clone(),
            reply,
        };
        self.submit(command, rx, "delete zettel").await
    }
}

impl Drop for FileService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn worker_loop(
    dir: Arc<PathBuf>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<FileCommand>>>,
    cancel: CancellationToken,
) {
    let mut rx = rx.lock().await;
    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = rx.recv() => command,
        };
        let Some(command) = command else {
            break;
        };
        command.run(&dir).await;
    }
}

async fn read_file(dir: &Path, name: &str) -> StoreResult<Vec<u8>> {
    let path = dir.join(name);
    tokio::fs::read(&path)
        .await
        .map_err(|error| StoreError::io(format!("read {}", path.display()), error))
}

async fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> StoreResult<()> {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|error| StoreError::io(format!("write {}", path.display()), error))
}

/// Metadata derived from the file name alone.
pub(crate) fn default_meta(zid: Zid, ext: &str) -> Meta {
    let mut meta = Meta::new(zid);
    meta.set(KEY_TITLE, &zid.to_string());
    meta.set(KEY_SYNTAX, syntax_from_ext(ext));
    meta
}

/// Fills in `syntax` when absent and records passed-over files.
pub(crate) fn cleanup_meta(meta: &mut Meta, entry: &DirEntry) {
    if meta.get(KEY_SYNTAX).is_none() {
        let syntax = if entry.content_ext.is_empty() {
            DEFAULT_SYNTAX
        } else {
            syntax_from_ext(&entry.content_ext)
        };
        meta.set(KEY_SYNTAX, syntax);
    }
    if !entry.useless_files.is_empty() {
        meta.set(KEY_USELESS_FILES, &entry.useless_files.join(" "));
    }
}

async fn read_meta(dir: &Path, entry: &DirEntry) -> StoreResult<Meta> {
    let mut meta = if !entry.meta_name.is_empty() {
        match read_file(dir, &entry.meta_name).await {
            Ok(bytes) => parse_header(entry.zid, &bytes).0,
            Err(StoreError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(zid = %entry.zid, file = %entry.meta_name, "metadata file vanished, using defaults");
                default_meta(entry.zid, &entry.content_ext)
            }
            Err(error) => return Err(error),
        }
    } else if entry.has_meta_in_content() {
        let bytes = read_file(dir, &entry.content_name).await?;
        parse_header(entry.zid, &bytes).0
    } else {
        default_meta(entry.zid, &entry.content_ext)
    };
    cleanup_meta(&mut meta, entry);
    Ok(meta)
}

async fn read_meta_content(dir: &Path, entry: &DirEntry) -> StoreResult<(Meta, Content)> {
    if entry.has_meta_in_content() {
        let bytes = read_file(dir, &entry.content_name).await?;
        let (mut meta, offset) = parse_header(entry.zid, &bytes);
        cleanup_meta(&mut meta, entry);
        return Ok((meta, Content::new(bytes[offset..].to_vec())));
    }
    let meta = read_meta(dir, entry).await?;
    let content = if entry.content_name.is_empty() {
        Content::default()
    } else {
        Content::new(read_file(dir, &entry.content_name).await?)
    };
    Ok((meta, content))
}

async fn write_zettel(dir: &Path, entry: &DirEntry, zettel: &Zettel) -> StoreResult<()> {
    if entry.has_meta_in_content() {
        let rendered = write_zettel_file(&zettel.meta, zettel.content.as_bytes());
        return write_file(dir, &entry.content_name, &rendered).await;
    }
    if !entry.meta_name.is_empty() {
        let mut header = Vec::new();
        write_header(&zettel.meta, &mut header);
        write_file(dir, &entry.meta_name, &header).await?;
    }
    if !entry.content_name.is_empty() {
        write_file(dir, &entry.content_name, zettel.content.as_bytes()).await?;
    }
    Ok(())
}

/// Removes every file of the entry. Missing files are fine; the first real
/// failure is reported after all removals were attempted.
async fn delete_files(dir: &Path, entry: &DirEntry) -> StoreResult<()> {
    let mut first_error = None;
    for name in entry.all_files() {
        let path = dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(error = %error, path = %path.display(), "cannot delete zettel file");
                if first_error.is_none() {
                    first_error = Some(StoreError::io(format!("delete {}", path.display()), error));
                }
            }
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
