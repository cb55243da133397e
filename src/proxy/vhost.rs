//! Host header to pool dispatch.
//!
//! Hosts are matched case-insensitively with any port stripped. A host
//! with no mapping goes to the default pool when one is set, otherwise to
//! the unnamed router (which answers `500`). One [`PoolRouter`] is created
//! per pool name the first time that name is needed.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::PoolRouteError;
use crate::pool::router::{PoolDeps, PoolRouter, PoolStatus};

pub struct VirtualHosts {
    hosts: HashMap<String, String>,
    default_pool: Option<String>,
    deps: Arc<PoolDeps>,
    routers: RwLock<HashMap<String, Arc<PoolRouter>>>,
    unnamed: Arc<PoolRouter>,
}

impl VirtualHosts {
    #[must_use]
    pub fn new(deps: Arc<PoolDeps>) -> Self {
        let unnamed = Arc::new(PoolRouter::new(None, Arc::clone(&deps)));
        Self {
            hosts: HashMap::new(),
            default_pool: None,
            deps,
            routers: RwLock::new(HashMap::new()),
            unnamed,
        }
    }

    /// Parse `host=pool` mappings as given on the command line.
    pub fn from_mappings(
        deps: Arc<PoolDeps>,
        mappings: &[String],
        default_pool: Option<String>,
    ) -> Result<Self, PoolRouteError> {
        let mut vhosts = Self::new(deps);
        for mapping in mappings {
            let (host, pool) = mapping
                .split_once('=')
                .map(|(h, p)| (h.trim(), p.trim()))
                .filter(|(h, p)| !h.is_empty() && !p.is_empty())
                .ok_or_else(|| PoolRouteError::InvalidVhost(mapping.clone()))?;
            vhosts = vhosts.with_host(host, pool);
        }
        if let Some(pool) = default_pool.filter(|p| !p.trim().is_empty()) {
            vhosts = vhosts.with_default_pool(pool.trim());
        }
        Ok(vhosts)
    }

    #[must_use]
    pub fn with_host(mut self, host: &str, pool: impl Into<String>) -> Self {
        self.hosts.insert(normalize_host(host), pool.into());
        self
    }

    #[must_use]
    pub fn with_default_pool(mut self, pool: impl Into<String>) -> Self {
        self.default_pool = Some(pool.into());
        self
    }

    /// Number of explicit host mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    #[must_use]
    pub fn default_pool(&self) -> Option<&str> {
        self.default_pool.as_deref()
    }

    #[must_use]
    pub fn pool_for(&self, host: Option<&str>) -> Option<&str> {
        host.and_then(|h| self.hosts.get(&normalize_host(h)))
            .or(self.default_pool.as_ref())
            .map(String::as_str)
    }

    pub async fn router_for(&self, host: Option<&str>) -> Arc<PoolRouter> {
        match self.pool_for(host) {
            Some(pool) => self.router(pool).await,
            None => Arc::clone(&self.unnamed),
        }
    }

    /// The router for `pool`, created on first use.
    pub async fn router(&self, pool: &str) -> Arc<PoolRouter> {
        if let Some(router) = self.routers.read().await.get(pool) {
            return Arc::clone(router);
        }

        let mut routers = self.routers.write().await;
        let router = routers.entry(pool.to_string()).or_insert_with(|| {
            tracing::debug!(pool = %pool, "creating pool router");
            Arc::new(PoolRouter::new(Some(pool.to_string()), Arc::clone(&self.deps)))
        });
        Arc::clone(router)
    }

    /// Every router created so far, ordered by pool name.
    pub async fn routers(&self) -> Vec<Arc<PoolRouter>> {
        let routers = self.routers.read().await;
        let mut names: Vec<&String> = routers.keys().collect();
        names.sort();
        names.into_iter().map(|n| Arc::clone(&routers[n])).collect()
    }

    pub async fn probes(&self) -> Vec<PoolStatus> {
        self.routers().await.iter().map(|r| r.probe()).collect()
    }

    /// Refresh every built pool, logging failures without stopping.
    pub async fn refresh_all(&self) {
        for router in self.routers().await {
            let pool = router.name().unwrap_or("-").to_string();
            match router.refresh().await {
                Ok(true) => {
                    self.deps.stats.refreshes.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(pool = %pool, "pool refreshed");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(pool = %pool, error = %e, "pool refresh failed, keeping current state");
                }
            }
        }
    }
}

/// Lowercase and drop any port, keeping IPv6 brackets.
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        host.find(']').map_or(host, |end| &host[..=end])
    } else {
        host.rsplit_once(':').map_or(host, |(h, _)| h)
    };
    without_port.to_ascii_lowercase()
}
