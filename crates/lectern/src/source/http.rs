use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::ContentSource;
use crate::error::SourceError;
use crate::item::Item;

const USER_AGENT: &str = concat!("lectern/", env!("CARGO_PKG_VERSION"));
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Lessons catalog served over HTTP.
///
/// - identifiers: `GET {base}?moduleId={key}` returning `{"lessons": [{"id": ...}]}`
/// - one item: `GET {base}?lesson={id}`, 404 meaning absent
/// - whole collection: `GET {base}/module-{key}.json`
/// - health: `GET {base}/health.json`
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct LessonIndex {
    #[serde(default)]
    lessons: Vec<Value>,
}

impl HttpSource {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .pool_max_idle_per_host(5)
            .build()?;
        Self::with_client(client, base)
    }

    pub fn with_client(client: Client, base: &str) -> Result<Self, SourceError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    fn index_url(&self, key: &str) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("moduleId", key);
        url
    }

    fn item_url(&self, id: &str) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("lesson", id);
        url
    }

    fn collection_url(&self, key: &str) -> Result<Url, SourceError> {
        Ok(self.base.join(&format!("module-{key}.json"))?)
    }

    fn health_url(&self) -> Result<Url, SourceError> {
        Ok(self.base.join("health.json")?)
    }

    /// Whether the catalog answers its health document with a success status
    /// within five seconds. Any failure reads as unhealthy.
    pub async fn health_check(&self) -> bool {
        let url = match self.health_url() {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, "Invalid health URL");
                return false;
            }
        };
        match self.client.get(url).timeout(HEALTH_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    async fn get_json(&self, url: Url) -> Result<Option<Value>, SourceError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response.error_for_status()?;
        Ok(Some(response.json().await?))
    }
}

/// Build an [`Item`] from a lesson document, keeping the whole document as payload.
fn item_from_value(value: Value, fallback_id: Option<&str>) -> Result<Item, SourceError> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .or(fallback_id)
        .ok_or_else(|| SourceError::Malformed("lesson without an id".into()))?
        .to_owned();
    let order = value.get("order").and_then(Value::as_i64);
    let title = value.get("title").and_then(Value::as_str).map(str::to_owned);

    Ok(Item {
        id,
        order,
        title,
        payload: value,
    })
}

#[async_trait]
impl ContentSource for HttpSource {
    async fn resolve_identifiers(&self, key: &str) -> Result<Vec<String>, SourceError> {
        let Some(body) = self.get_json(self.index_url(key)).await? else {
            return Ok(Vec::new());
        };
        let index: LessonIndex = serde_json::from_value(body)?;
        index
            .lessons
            .iter()
            .map(|lesson| {
                lesson
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        SourceError::Malformed(format!("lesson entry without an id in {key}"))
                    })
            })
            .collect()
    }

    async fn fetch_item(&self, id: &str) -> Result<Option<Item>, SourceError> {
        match self.get_json(self.item_url(id)).await? {
            Some(body) => item_from_value(body, Some(id)).map(Some),
            None => Ok(None),
        }
    }

    async fn fetch_collection(&self, key: &str) -> Result<Vec<Item>, SourceError> {
        let body = match self.get_json(self.collection_url(key)?).await? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };
        let lessons = match body {
            Value::Array(lessons) => lessons,
            other => serde_json::from_value::<LessonIndex>(other)?.lessons,
        };
        lessons
            .into_iter()
            .map(|lesson| item_from_value(lesson, None))
            .collect()
    }
}
