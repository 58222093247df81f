//! Collection-level reads: identifier listing and the whole-collection fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::LoadError;
use crate::item::{Item, ItemId};
use crate::source::ContentSource;

#[derive(Clone)]
pub struct IdentifierResolver {
    source: Arc<dyn ContentSource>,
    timeout: Duration,
}

impl IdentifierResolver {
    pub fn new(source: Arc<dyn ContentSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Ordered identifiers for `key`. An empty list is not an error.
    pub async fn resolve(&self, key: &str) -> Result<Vec<ItemId>, LoadError> {
        let ids = match tokio::time::timeout(self.timeout, self.source.resolve_identifiers(key))
            .await
        {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Identifier list unavailable");
                return Err(LoadError::resolution(key, e));
            }
            Err(_) => {
                warn!(key = %key, timeout = ?self.timeout, "Identifier list timed out");
                return Err(LoadError::resolution(
                    key,
                    format!("identifier list timed out after {:?}", self.timeout),
                ));
            }
        };

        debug!(key = %key, count = ids.len(), "Resolved identifiers");
        Ok(ids)
    }

    /// Every item of `key` in one call. Failure here is a resolution failure.
    pub async fn fetch_whole(&self, key: &str) -> Result<Vec<Item>, LoadError> {
        match tokio::time::timeout(self.timeout, self.source.fetch_collection(key)).await {
            Ok(Ok(items)) => Ok(items),
            Ok(Err(e)) => Err(LoadError::resolution(
                key,
                format!("whole-collection fetch failed: {e}"),
            )),
            Err(_) => Err(LoadError::resolution(
                key,
                format!("whole-collection fetch timed out after {:?}", self.timeout),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;

    #[tokio::test(start_paused = true)]
    async fn test_empty_list_is_valid() {
        let source = Arc::new(ScriptedSource::new());
        let resolver = IdentifierResolver::new(source.clone(), Duration::from_secs(5));
        assert!(resolver.resolve("module-9").await.unwrap().is_empty());
        assert_eq!(source.resolve_calls("module-9"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_and_timeout_are_resolution_errors() {
        let source = Arc::new(
            ScriptedSource::new()
                .fail_resolution("module-1")
                .resolve_latency("module-2", Duration::from_secs(60))
                .with_collection("module-2", ["a"]),
        );
        let resolver = IdentifierResolver::new(source, Duration::from_secs(5));

        let err = resolver.resolve("module-1").await.unwrap_err();
        assert!(matches!(err, LoadError::Resolution { ref key, .. } if key == "module-1"));

        let err = resolver.resolve("module-2").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
