use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;
use crate::item::Item;
use crate::source::ContentSource;

/// Fetches one item per call with a per-attempt timeout. Duplicate requests for
/// the same identifier are filtered out upstream by the item cache.
#[derive(Clone)]
pub struct ItemFetcher {
    source: Arc<dyn ContentSource>,
    timeout: Duration,
}

impl ItemFetcher {
    pub fn new(source: Arc<dyn ContentSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `Ok(None)` means the identifier has no content and must not be retried.
    pub async fn fetch(&self, id: &str) -> Result<Option<Item>, FetchError> {
        match tokio::time::timeout(self.timeout, self.source.fetch_item(id)).await {
            Ok(Ok(item)) => {
                debug!(id = %id, found = item.is_some(), "Fetched item");
                Ok(item)
            }
            Ok(Err(e)) => Err(FetchError::Failure {
                id: id.to_owned(),
                reason: e.to_string(),
            }),
            Err(_) => Err(FetchError::Timeout {
                id: id.to_owned(),
                after: self.timeout,
            }),
        }
    }
}
