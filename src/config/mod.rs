//! Access to the hierarchical configuration store.
//!
//! Defines the [`ConfigStore`] trait for pluggable store backends, the
//! [`ConfigResolver`] for primary/fallback store resolution, and the
//! key layout helpers shared by every reader. Submodules provide the
//! node's own settings model, the pool configuration reader, validation
//! logic, and concrete store implementations.

pub mod model;
pub mod pool;
pub mod sources;
pub mod validation;

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::error::PoolRouteError;

/// One child node returned by [`ConfigStore::list_children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub key: String,
    pub value: String,
}

impl StoreEntry {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Last path segment of the key.
    #[must_use]
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

// async_trait is required here because ConfigStore is used as Arc<dyn ConfigStore>
// and native async fn in traits (Rust 1.75+) does not support dyn dispatch.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Value stored at `key`, or `None` when the key does not exist.
    async fn get_value(&self, key: &str) -> Result<Option<String>, PoolRouteError>;

    /// Direct children of `prefix` that carry a value, ordered with
    /// [`child_order`].
    async fn list_children(&self, prefix: &str) -> Result<Vec<StoreEntry>, PoolRouteError>;
}

/// Join key segments with `/`, ignoring stray separators at the edges.
#[must_use]
pub fn join_key(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether `key` is a direct child of `prefix` (one segment deeper).
#[must_use]
pub fn is_direct_child(prefix: &str, key: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// Ordering for sibling keys: numeric last segments compare as numbers
/// (`targets/2` before `targets/10`), everything else lexically.
#[must_use]
pub fn child_order(a: &str, b: &str) -> Ordering {
    let last = |k: &str| k.rsplit('/').next().unwrap_or(k).to_string();
    let (la, lb) = (last(a), last(b));
    match (la.parse::<u64>(), lb.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Primary store with an optional fallback consulted when the primary fails.
pub struct ConfigResolver {
    primary: Box<dyn ConfigStore>,
    fallback: Option<Box<dyn ConfigStore>>,
}

impl ConfigResolver {
    #[must_use]
    pub fn new(primary: Box<dyn ConfigStore>, fallback: Option<Box<dyn ConfigStore>>) -> Self {
        Self { primary, fallback }
    }

    #[must_use]
    pub fn primary_name(&self) -> &str {
        self.primary.name()
    }

    #[must_use]
    pub fn primary(&self) -> &dyn ConfigStore {
        &*self.primary
    }

    fn report_fallback(&self, fallback: &dyn ConfigStore, key: &str, err: &PoolRouteError) {
        tracing::warn!(
            primary = self.primary.name(),
            fallback = fallback.name(),
            key = %key,
            error = %err,
            "primary config store failed, using fallback"
        );
    }
}

#[async_trait]
impl ConfigStore for ConfigResolver {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, PoolRouteError> {
        match self.primary.get_value(key).await {
            Ok(value) => Ok(value),
            Err(primary_err) => {
                if let Some(ref fallback) = self.fallback {
                    self.report_fallback(&**fallback, key, &primary_err);
                    fallback.get_value(key).await
                } else {
                    Err(primary_err)
                }
            }
        }
    }

    async fn list_children(&self, prefix: &str) -> Result<Vec<StoreEntry>, PoolRouteError> {
        match self.primary.list_children(prefix).await {
            Ok(entries) => Ok(entries),
            Err(primary_err) => {
                if let Some(ref fallback) = self.fallback {
                    self.report_fallback(&**fallback, prefix, &primary_err);
                    fallback.list_children(prefix).await
                } else {
                    Err(primary_err)
                }
            }
        }
    }
}
