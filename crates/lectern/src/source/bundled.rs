use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::ContentSource;
use crate::error::SourceError;
use crate::item::{CollectionKey, Item, ItemId};

#[derive(Debug, Default, Deserialize)]
struct Catalog {
    #[serde(default)]
    collections: HashMap<CollectionKey, Vec<ItemId>>,
}

/// Content shipped as JSON files:
///
/// ```text
/// <root>/catalog.json               {"collections": {"module-1": ["lesson-1", ...]}}
/// <root>/items/<id>.json            one item
/// <root>/collections/<key>.json     array of items (whole-collection path)
/// ```
#[derive(Debug)]
pub struct BundledStore {
    root: PathBuf,
    catalog: Catalog,
    /// Keys with a whole-collection file
    bulk: BTreeSet<CollectionKey>,
}

impl BundledStore {
    /// Open the store at `root`, reading its catalog. A missing catalog is
    /// treated as empty so stores may rely on whole-collection files only.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let root = root.into();
        let catalog_path = root.join("catalog.json");

        let catalog = match tokio::fs::read(&catalog_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SourceError::Malformed(format!("{}: {e}", catalog_path.display()))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %catalog_path.display(), "No catalog found, using empty catalog");
                Catalog::default()
            }
            Err(e) => return Err(e.into()),
        };

        let bulk = scan_collections(&root.join("collections")).await?;

        info!(
            root = %root.display(),
            collections = catalog.collections.len(),
            bulk = bulk.len(),
            "Opened bundled store"
        );
        Ok(Self {
            root,
            catalog,
            bulk,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collection keys declared in the catalog or shipped as a
    /// whole-collection file, sorted.
    pub fn collection_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .catalog
            .collections
            .keys()
            .chain(&self.bulk)
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    fn item_path(&self, id: &str) -> Result<PathBuf, SourceError> {
        Ok(self.root.join("items").join(format!("{}.json", file_stem(id)?)))
    }

    fn collection_path(&self, key: &str) -> Result<PathBuf, SourceError> {
        Ok(self
            .root
            .join("collections")
            .join(format!("{}.json", file_stem(key)?)))
    }
}

/// Identifiers become file names; refuse anything that could escape the store.
fn file_stem(name: &str) -> Result<&str, SourceError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(SourceError::Malformed(format!(
            "'{name}' is not a valid identifier"
        )));
    }
    Ok(name)
}

/// Stems of the `.json` files in `dir`; a missing directory has none.
async fn scan_collections(dir: &Path) -> Result<BTreeSet<CollectionKey>, SourceError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(e.into()),
    };

    let mut keys = BTreeSet::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.extension().is_some_and(|ext| ext == "json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            keys.insert(stem.to_owned());
        }
    }
    Ok(keys)
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SourceError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ContentSource for BundledStore {
    async fn resolve_identifiers(&self, key: &str) -> Result<Vec<String>, SourceError> {
        Ok(self.catalog.collections.get(key).cloned().unwrap_or_default())
    }

    async fn fetch_item(&self, id: &str) -> Result<Option<Item>, SourceError> {
        let path = self.item_path(id)?;
        let Some(bytes) = read_optional(&path).await? else {
            debug!(id = %id, path = %path.display(), "Item file not found");
            return Ok(None);
        };
        let mut item: Item = serde_json::from_slice(&bytes)?;
        if item.id.is_empty() {
            item.id = id.to_owned();
        }
        Ok(Some(item))
    }

    async fn fetch_collection(&self, key: &str) -> Result<Vec<Item>, SourceError> {
        let path = self.collection_path(key)?;
        match read_optional(&path).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn is_known(&self, key: &str) -> bool {
        self.catalog.collections.contains_key(key)
            || self.bulk.contains(key)
            || self
                .catalog
                .collections
                .values()
                .any(|ids| ids.iter().any(|id| id == key))
    }
}
