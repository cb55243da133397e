//! Reads one pool's configuration out of the config store.
//!
//! Layout under the pools root:
//!
//! ```text
//! <root>/<pool>/targets/<id>   = http://10.0.0.1:8080
//! <root>/<pool>/loadbalance    = round_robin
//! ```
//!
//! Malformed target values are collected in [`PoolSpec::rejected`] instead
//! of failing the whole read. An unrecognized algorithm name, or any store
//! failure, fails the read.

use crate::balance::Algorithm;
use crate::error::PoolRouteError;
use crate::pool::target::Target;

use super::model::ProxyDefaults;
use super::ConfigStore;

/// A target entry that could not be parsed.
#[derive(Debug, Clone)]
pub struct RejectedTarget {
    pub key: String,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PoolSpec {
    pub name: String,
    pub targets: Vec<Target>,
    pub rejected: Vec<RejectedTarget>,
    /// `None` when the pool does not set `loadbalance`.
    pub algorithm: Option<Algorithm>,
}

impl PoolSpec {
    #[must_use]
    pub fn algorithm_or(&self, default: Algorithm) -> Algorithm {
        self.algorithm.unwrap_or(default)
    }
}

pub async fn read_pool(
    store: &dyn ConfigStore,
    defaults: &ProxyDefaults,
    name: &str,
) -> Result<PoolSpec, PoolRouteError> {
    let entries = store.list_children(&defaults.targets_key(name)).await?;

    let mut targets: Vec<Target> = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();
    for entry in entries {
        match Target::parse(&entry.value) {
            Ok(target) => {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
            Err(e) => {
                let reason = match e {
                    PoolRouteError::InvalidTarget { reason, .. } => reason,
                    other => other.to_string(),
                };
                rejected.push(RejectedTarget {
                    key: entry.key,
                    value: entry.value,
                    reason,
                });
            }
        }
    }

    let algorithm = match store.get_value(&defaults.algorithm_key(name)).await? {
        Some(value) => Some(value.parse::<Algorithm>()?),
        None => None,
    };

    Ok(PoolSpec {
        name: name.to_string(),
        targets,
        rejected,
        algorithm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sources::memory::MemoryStore;

    fn store(pairs: &[(&str, &str)]) -> MemoryStore {
        MemoryStore::from_pairs(pairs.iter().copied())
    }

    #[tokio::test]
    async fn reads_targets_and_algorithm() {
        let store = store(&[
            ("pools/checkout/targets/0", "http://10.0.0.1:8080"),
            ("pools/checkout/targets/1", "http://10.0.0.2:8080"),
            ("pools/checkout/loadbalance", "round_robin"),
        ]);
        let spec = read_pool(&store, &ProxyDefaults::default(), "checkout")
            .await
            .unwrap();
        assert_eq!(spec.targets.len(), 2);
        assert_eq!(spec.targets[0].to_string(), "http://10.0.0.1:8080");
        assert_eq!(spec.algorithm, Some(Algorithm::RoundRobin));
        assert!(spec.rejected.is_empty());
    }

    #[tokio::test]
    async fn missing_algorithm_is_none() {
        let store = store(&[("pools/p/targets/0", "http://a:80")]);
        let spec = read_pool(&store, &ProxyDefaults::default(), "p").await.unwrap();
        assert_eq!(spec.algorithm, None);
        assert_eq!(spec.algorithm_or(Algorithm::Random), Algorithm::Random);
    }

    #[tokio::test]
    async fn malformed_targets_are_rejected_individually() {
        let store = store(&[
            ("pools/p/targets/0", "not-a-uri"),
            ("pools/p/targets/1", "http://ok:80"),
        ]);
        let spec = read_pool(&store, &ProxyDefaults::default(), "p").await.unwrap();
        assert_eq!(spec.targets.len(), 1);
        assert_eq!(spec.rejected.len(), 1);
        assert_eq!(spec.rejected[0].key, "pools/p/targets/0");
        assert_eq!(spec.rejected[0].value, "not-a-uri");
    }

    #[tokio::test]
    async fn duplicate_targets_collapse() {
        let store = store(&[
            ("pools/p/targets/0", "http://a:80"),
            ("pools/p/targets/1", "http://a"),
        ]);
        let spec = read_pool(&store, &ProxyDefaults::default(), "p").await.unwrap();
        assert_eq!(spec.targets.len(), 1);
    }

    #[tokio::test]
    async fn unknown_algorithm_fails() {
        let store = store(&[
            ("pools/p/targets/0", "http://a:80"),
            ("pools/p/loadbalance", "fastest"),
        ]);
        let err = read_pool(&store, &ProxyDefaults::default(), "p")
            .await
            .unwrap_err();
        assert!(matches!(err, PoolRouteError::UnknownAlgorithm { .. }));
    }

    #[tokio::test]
    async fn unknown_pool_is_empty() {
        let store = store(&[]);
        let spec = read_pool(&store, &ProxyDefaults::default(), "ghost")
            .await
            .unwrap();
        assert!(spec.targets.is_empty());
        assert!(spec.algorithm.is_none());
    }
}
