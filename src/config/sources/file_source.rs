//! Generic async file-backed config store.
//!
//! [`FileSource`] implements [`ConfigStore`] for any document format by
//! accepting a deserialization function at construction time. Every call
//! re-reads the file asynchronously via Tokio and flattens the document,
//! so edits become visible to the next pool build or refresh.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::flatten;
use super::memory::MemoryStore;
use crate::config::{ConfigStore, StoreEntry};
use crate::error::PoolRouteError;

pub type Deserialize = fn(&str) -> Result<Value, Box<dyn std::error::Error + Send + Sync>>;

pub struct FileSource {
    path: PathBuf,
    name: &'static str,
    deserialize: Deserialize,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, name: &'static str, deserialize: Deserialize) -> Self {
        Self {
            path,
            name,
            deserialize,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_content(&self) -> Result<String, PoolRouteError> {
        tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PoolRouteError::ConfigFileNotFound {
                    path: self.path.clone(),
                }
            } else {
                PoolRouteError::Io(e)
            }
        })
    }

    /// Read and flatten the whole document.
    pub async fn load(&self) -> Result<MemoryStore, PoolRouteError> {
        let content = self.read_content().await?;
        let document =
            (self.deserialize)(&content).map_err(|e| PoolRouteError::ConfigParse {
                path: self.path.display().to_string(),
                source: e,
            })?;
        Ok(MemoryStore::from_map(flatten(&document)))
    }
}

#[async_trait]
impl ConfigStore for FileSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, PoolRouteError> {
        Ok(self.load().await?.value(key))
    }

    async fn list_children(&self, prefix: &str) -> Result<Vec<StoreEntry>, PoolRouteError> {
        Ok(self.load().await?.children(prefix))
    }
}
