//! Redis-backed config store.
//!
//! [`RedisSource`] implements [`ConfigStore`] over plain string keys that
//! follow the same `/`-separated hierarchy as the file stores
//! (`pools/checkout/targets/0`). Values are read with `GET`; children are
//! discovered with `SCAN MATCH <prefix>/*` and fetched with one `MGET`.

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::config::{child_order, is_direct_child, ConfigStore, StoreEntry};
use crate::error::PoolRouteError;

pub struct RedisSource {
    connection: Mutex<redis::aio::MultiplexedConnection>,
}

impl RedisSource {
    pub async fn new(url: &str) -> Result<Self, PoolRouteError> {
        let client = redis::Client::open(url).map_err(|e| PoolRouteError::store("redis", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PoolRouteError::store("redis", e))?;

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

/// Escape glob metacharacters so a key prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[async_trait]
impl ConfigStore for RedisSource {
    fn name(&self) -> &'static str {
        "redis"
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn get_value(&self, key: &str) -> Result<Option<String>, PoolRouteError> {
        let mut conn = self.connection.lock().await;
        conn.get(key.trim_matches('/'))
            .await
            .map_err(|e| PoolRouteError::store("redis", e))
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn list_children(&self, prefix: &str) -> Result<Vec<StoreEntry>, PoolRouteError> {
        let prefix = prefix.trim_matches('/');
        let pattern = format!("{}/*", escape_glob(prefix));

        let mut conn = self.connection.lock().await;

        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(|e| PoolRouteError::store("redis", e))?;
            while let Some(key) = iter.next_item().await {
                if is_direct_child(prefix, &key) {
                    keys.push(key);
                }
            }
        }

        if keys.is_empty() {
            return Ok(Vec::new());
        }
        keys.sort_by(|a, b| child_order(a, b));
        keys.dedup();

        // Explicit MGET: the `mget` helper degrades to GET for a single key.
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut *conn)
            .await
            .map_err(|e| PoolRouteError::store("redis", e))?;

        // A key can vanish between SCAN and MGET; skip it.
        Ok(keys
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| StoreEntry::new(key, v)))
            .collect())
    }
}
