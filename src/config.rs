use crate::dirbox::service::{make_prime, DEFAULT_WORKERS, MAX_WORKERS, MIN_WORKERS};
use crate::errors::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_MAX_ANTEROOM_LOAD: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifierKind {
    #[default]
    Notify,
    Simple,
}

impl NotifierKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Simple => "simple",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "notify" => Some(Self::Notify),
            "simple" => Some(Self::Simple),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirBoxConfig {
    pub path: PathBuf,
    pub readonly: bool,
    pub notifier: NotifierKind,
    pub workers: usize,
    pub service_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Syntaxes besides `zmk` and `none` that are stored as `.zettel` files.
    pub zettel_file_syntax: Vec<String>,
}

impl Default for DirBoxConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            readonly: false,
            notifier: NotifierKind::default(),
            workers: DEFAULT_WORKERS,
            service_timeout_ms: DEFAULT_SERVICE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            zettel_file_syntax: Vec::new(),
        }
    }
}

impl DirBoxConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Parses `dir:///path?readonly&type=simple&worker=13`. Unknown notifier
    /// types fall back to `default_kind`.
    pub fn from_url(location: &str, default_kind: NotifierKind) -> StoreResult<Self> {
        let url = Url::parse(location)
            .map_err(|error| StoreError::InvalidConfig(format!("{location}: {error}")))?;
        if url.scheme() != "dir" {
            return Err(StoreError::InvalidConfig(format!(
                "{location}: expected dir scheme, got {}",
                url.scheme()
            )));
        }
        let mut config = Self::new(url_path(&url));
        config.notifier = default_kind;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "readonly" => config.readonly = true,
                "type" => {
                    config.notifier = NotifierKind::parse(&value).unwrap_or(default_kind);
                }
                "worker" => match value.parse::<usize>() {
                    Ok(workers) => config.workers = workers.clamp(MIN_WORKERS, MAX_WORKERS),
                    Err(_) => {
                        tracing::warn!(location, value = %value, "ignoring malformed worker count");
                    }
                },
                _ => {}
            }
        }
        Ok(config)
    }

    /// Number of file workers actually started: the next prime.
    pub fn worker_count(&self) -> usize {
        make_prime(self.workers.clamp(MIN_WORKERS, MAX_WORKERS))
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn location(&self) -> String {
        format!("dir://{}", self.path.display())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipBoxConfig {
    pub path: PathBuf,
}

impl ZipBoxConfig {
    pub fn from_url(location: &str) -> StoreResult<Self> {
        let url = Url::parse(location)
            .map_err(|error| StoreError::InvalidConfig(format!("{location}: {error}")))?;
        if url.scheme() != "zip" {
            return Err(StoreError::InvalidConfig(format!(
                "{location}: expected zip scheme, got {}",
                url.scheme()
            )));
        }
        Ok(Self {
            path: url_path(&url),
        })
    }

    pub fn location(&self) -> String {
        format!("zip://{}", self.path.display())
    }
}

fn url_path(url: &Url) -> PathBuf {
    url.to_file_path()
        .unwrap_or_else(|_| PathBuf::from(url.path()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexerConfig {
    /// Room capacity of the anteroom; zero selects the default.
    pub max_anteroom_load: usize,
    pub idle_wait_ms: u64,
    pub max_retries: u32,
    /// Pause before a failed zettel is queued again.
    pub retry_delay_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_anteroom_load: DEFAULT_MAX_ANTEROOM_LOAD,
            idle_wait_ms: 1_000,
            max_retries: 3,
            retry_delay_ms: 250,
        }
    }
}

impl IndexerConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
