use std::time::Duration;

use crate::item::{CollectionKey, ItemId};

/// Errors reported by a [`ContentSource`](crate::source::ContentSource) implementation.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed data: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Item-level failure. Retried by the [`RetryPolicy`](crate::RetryPolicy) and, once
/// retries are exhausted, the item is skipped rather than failing the collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Timed out after {after:?} fetching item {id}")]
    Timeout { id: ItemId, after: Duration },

    #[error("Failed to fetch item {id}: {reason}")]
    Failure { id: ItemId, reason: String },
}

impl FetchError {
    pub fn id(&self) -> &str {
        match self {
            FetchError::Timeout { id, .. } | FetchError::Failure { id, .. } => id,
        }
    }
}

/// Collection-level failure, surfaced to every caller waiting on the load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to resolve collection {key}: {reason}")]
    Resolution { key: CollectionKey, reason: String },

    #[error("Load of collection {key} aborted: {reason}")]
    Aborted { key: CollectionKey, reason: String },
}

impl LoadError {
    pub fn key(&self) -> &str {
        match self {
            LoadError::Resolution { key, .. } | LoadError::Aborted { key, .. } => key,
        }
    }

    pub(crate) fn resolution(key: &str, reason: impl ToString) -> Self {
        LoadError::Resolution {
            key: key.to_owned(),
            reason: reason.to_string(),
        }
    }
}

/// A spawned load ended without producing a result (it panicked or was cancelled).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task for {key} aborted: {reason}")]
pub struct TaskAborted {
    pub key: String,
    pub reason: String,
}

impl From<TaskAborted> for LoadError {
    fn from(aborted: TaskAborted) -> Self {
        LoadError::Aborted {
            key: aborted.key,
            reason: aborted.reason,
        }
    }
}

impl From<TaskAborted> for FetchError {
    fn from(aborted: TaskAborted) -> Self {
        FetchError::Failure {
            id: aborted.key,
            reason: aborted.reason,
        }
    }
}
