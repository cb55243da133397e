//! In-process config store backed by a sorted map.
//!
//! Used directly in tests and as the lookup structure behind the file
//! stores once a document has been flattened.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::config::{child_order, is_direct_child, ConfigStore, StoreEntry};
use crate::error::PoolRouteError;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_map(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.write().remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Synchronous lookup, shared with the file stores.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        self.read().get(key.trim_matches('/')).cloned()
    }

    /// Synchronous child listing, shared with the file stores.
    #[must_use]
    pub fn children(&self, prefix: &str) -> Vec<StoreEntry> {
        let prefix = prefix.trim_matches('/');
        let start = format!("{prefix}/");
        let entries = self.read();
        let mut children: Vec<StoreEntry> = entries
            .range(start.clone()..)
            .take_while(|(k, _)| k.starts_with(&start))
            .filter(|(k, _)| is_direct_child(prefix, k))
            .map(|(k, v)| StoreEntry::new(k.clone(), v.clone()))
            .collect();
        children.sort_by(|a, b| child_order(&a.key, &b.key));
        children
    }

    // A poisoned lock only means a writer panicked mid-insert on a plain
    // map; the data is still a valid map, so keep serving it.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, PoolRouteError> {
        Ok(self.value(key))
    }

    async fn list_children(&self, prefix: &str) -> Result<Vec<StoreEntry>, PoolRouteError> {
        Ok(self.children(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_direct_children_in_order() {
        let store = MemoryStore::from_pairs([
            ("pools/a/targets/10", "http://j:80"),
            ("pools/a/targets/2", "http://b:80"),
            ("pools/a/targets/0", "http://a:80"),
            ("pools/a/targets/0/meta", "x"),
            ("pools/a/targetsx/0", "nope"),
            ("pools/a/loadbalance", "random"),
        ]);
        let children = store.list_children("pools/a/targets").await.unwrap();
        let keys: Vec<&str> = children.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["pools/a/targets/0", "pools/a/targets/2", "pools/a/targets/10"]
        );
    }

    #[tokio::test]
    async fn get_value_handles_missing_keys() {
        let store = MemoryStore::from_pairs([("pools/a/loadbalance", "random")]);
        assert_eq!(
            store.get_value("pools/a/loadbalance").await.unwrap().as_deref(),
            Some("random")
        );
        assert_eq!(store.get_value("pools/b/loadbalance").await.unwrap(), None);
    }

    #[test]
    fn insert_and_remove() {
        let store = MemoryStore::new();
        store.insert("k", "v");
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove("k").as_deref(), Some("v"));
        assert!(store.is_empty());
    }
}
