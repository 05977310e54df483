use crate::id::{Zid, ZidError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("NOT_FOUND: zettel {0} not found")]
    NotFound(Zid),
    #[error("INVALID_ZID: {0}")]
    InvalidZid(String),
    #[error("READ_ONLY: box does not allow modifications")]
    ReadOnly,
    #[error("NO_DIRECTORY: {0}")]
    NoDirectory(String),
    #[error("TIMEOUT: {0}")]
    Timeout(String),
    #[error("EXHAUSTED_IDS: no free zettel identifier available")]
    ExhaustedIds,
    #[error("IO_FAILURE: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("INVALID_CONFIG: {0}")]
    InvalidConfig(String),
    #[error("STOPPED: {0}")]
    Stopped(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Failures the indexer may retry later; everything else is final for the current attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Io { .. } | Self::Stopped(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::io("filesystem", value)
    }
}

impl From<ZidError> for StoreError {
    fn from(value: ZidError) -> Self {
        match value {
            ZidError::Exhausted(_) => Self::ExhaustedIds,
            other => Self::InvalidZid(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::StoreError;
    use crate::id::Zid;

    #[test]
    fn display_carries_error_code() {
        let err = StoreError::NotFound(Zid::from_u64(20200310195100));
        assert_eq!(err.to_string(), "NOT_FOUND: zettel 20200310195100 not found");
        assert!(StoreError::ReadOnly.to_string().starts_with("READ_ONLY"));
    }

    #[test]
    fn retry_classification() {
        assert!(StoreError::Timeout("slow".to_string()).is_retryable());
        assert!(StoreError::io("read", std::io::Error::other("boom")).is_retryable());
        assert!(!StoreError::NotFound(Zid::INVALID).is_retryable());
        assert!(!StoreError::ReadOnly.is_retryable());
    }
}
