//! Node-level proxy settings.
//!
//! [`ProxyDefaults`] holds the knobs that apply to every pool served by
//! this node: where pools live in the config store, the outbound request
//! timeout, the per-upstream connection pool bound, proxy header policy,
//! and the process-default load balancing algorithm.

use serde::{Deserialize, Serialize};

use crate::balance::Algorithm;

pub const DEFAULT_POOLS_ROOT: &str = "pools";

const fn default_timeout() -> u64 {
    30_000
}

const fn default_connections_per_host() -> usize {
    2000
}

const fn default_true() -> bool {
    true
}

fn default_pools_root() -> String {
    DEFAULT_POOLS_ROOT.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyDefaults {
    #[serde(default = "default_pools_root")]
    pub pools_root: String,

    /// Deadline in milliseconds for one forwarded exchange, body included.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Concurrent requests allowed per backend; also the idle pool size.
    #[serde(default = "default_connections_per_host")]
    pub connections_per_host: usize,

    #[serde(default = "default_true")]
    pub proxy_headers: bool,

    #[serde(default = "default_true")]
    pub strip_hop_by_hop: bool,

    #[serde(default)]
    pub default_algorithm: Algorithm,
}

impl Default for ProxyDefaults {
    fn default() -> Self {
        Self {
            pools_root: default_pools_root(),
            timeout: default_timeout(),
            connections_per_host: default_connections_per_host(),
            proxy_headers: default_true(),
            strip_hop_by_hop: default_true(),
            default_algorithm: Algorithm::default(),
        }
    }
}

impl ProxyDefaults {
    #[must_use]
    pub fn targets_key(&self, pool: &str) -> String {
        super::join_key(&[&self.pools_root, pool, "targets"])
    }

    #[must_use]
    pub fn algorithm_key(&self, pool: &str) -> String {
        super::join_key(&[&self.pools_root, pool, "loadbalance"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let defaults = ProxyDefaults::default();
        assert_eq!(defaults.pools_root, "pools");
        assert_eq!(defaults.timeout, 30_000);
        assert_eq!(defaults.connections_per_host, 2000);
        assert!(defaults.proxy_headers);
        assert!(defaults.strip_hop_by_hop);
        assert_eq!(defaults.default_algorithm, Algorithm::RoundRobin);
    }

    #[test]
    fn pool_keys_follow_layout() {
        let defaults = ProxyDefaults::default();
        assert_eq!(defaults.targets_key("checkout"), "pools/checkout/targets");
        assert_eq!(defaults.algorithm_key("checkout"), "pools/checkout/loadbalance");
    }

    #[test]
    fn custom_root_is_honoured() {
        let defaults = ProxyDefaults {
            pools_root: "/galeb/pools/".into(),
            ..ProxyDefaults::default()
        };
        assert_eq!(defaults.targets_key("a"), "galeb/pools/a/targets");
    }

    #[test]
    fn deserializes_with_defaults() {
        let defaults: ProxyDefaults =
            serde_json::from_str(r#"{"default_algorithm": "random"}"#).unwrap();
        assert_eq!(defaults.default_algorithm, Algorithm::Random);
        assert_eq!(defaults.timeout, 30_000);
    }
}
