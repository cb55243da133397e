//! Per-pool request router with a lazy, build-once pool.
//!
//! A [`PoolRouter`] starts unbuilt. The first request reads the pool's
//! targets and `loadbalance` key from the config store, populates a
//! [`BackendSet`], installs the host selector, and only then forwards.
//! Concurrent first requests wait on the same build; later requests skip
//! the store entirely.
//!
//! A failed build (store error, unknown algorithm) answers `500` and leaves
//! the router unbuilt, so the next request tries again. A router without a
//! pool name answers `500` without touching the store.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::balance::{Algorithm, HostSelectorRegistry};
use crate::config::model::ProxyDefaults;
use crate::config::pool::{read_pool, PoolSpec};
use crate::config::ConfigStore;
use crate::error::PoolRouteError;
use crate::proxy::client::ForwardingClient;
use crate::proxy::{headers, synthesized};
use crate::server::{self, HttpClient, HttpsConnector, Stats};

use super::backend_set::BackendSet;

/// Everything a router needs besides its own name, shared by all pools.
pub struct PoolDeps {
    pub store: Arc<dyn ConfigStore>,
    pub http_client: HttpClient,
    pub connector: HttpsConnector,
    pub defaults: ProxyDefaults,
    pub stats: Stats,
}

impl PoolDeps {
    /// Builds the upstream connector and pooled client from `defaults`.
    #[must_use]
    pub fn new(store: Arc<dyn ConfigStore>, defaults: ProxyDefaults) -> Self {
        let connector = server::build_connector();
        let http_client = server::build_http_client(connector.clone(), defaults.connections_per_host);
        Self {
            store,
            http_client,
            connector,
            defaults,
            stats: Stats::new(),
        }
    }
}

/// Read-only view of a router, reported by `/health` and `inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub name: Option<String>,
    pub built: bool,
    pub targets: Vec<String>,
    pub algorithm: Option<Algorithm>,
}

pub struct PoolRouter {
    name: Option<String>,
    deps: Arc<PoolDeps>,
    client: OnceCell<Arc<ForwardingClient>>,
}

impl PoolRouter {
    #[must_use]
    pub fn new(name: Option<String>, deps: Arc<PoolDeps>) -> Self {
        Self {
            name,
            deps,
            client: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.client.initialized()
    }

    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let Some(name) = self.name.as_deref() else {
            let correlation_id = headers::correlation_id(request.headers());
            tracing::warn!(
                correlation_id = %correlation_id,
                "request reached a router without a pool name"
            );
            self.deps.stats.failed.fetch_add(1, Ordering::Relaxed);
            return synthesized(StatusCode::INTERNAL_SERVER_ERROR, &correlation_id);
        };

        let client = match self.client.get_or_try_init(|| self.build(name)).await {
            Ok(client) => client,
            Err(e) => {
                let correlation_id = headers::correlation_id(request.headers());
                tracing::error!(
                    correlation_id = %correlation_id,
                    pool = %name,
                    error = %e,
                    "pool build failed"
                );
                self.deps.stats.failed.fetch_add(1, Ordering::Relaxed);
                return synthesized(StatusCode::INTERNAL_SERVER_ERROR, &correlation_id);
            }
        };

        client.forward(request).await
    }

    async fn build(&self, name: &str) -> Result<Arc<ForwardingClient>, PoolRouteError> {
        tracing::info!(pool = %name, store = self.deps.store.name(), "building pool");

        let spec = read_pool(&*self.deps.store, &self.deps.defaults, name).await?;
        report_rejected(&spec);

        let backends = Arc::new(BackendSet::with_connection_limit(
            self.deps.defaults.connections_per_host,
        ));
        for target in spec.targets.iter().cloned() {
            tracing::info!(pool = %name, target = %target, "added target");
            backends.add(target);
        }

        let algorithm = spec.algorithm_or(self.deps.defaults.default_algorithm);
        let selectors = Arc::new(HostSelectorRegistry::new(algorithm));

        self.deps.stats.builds.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            pool = %name,
            targets = backends.len(),
            algorithm = %algorithm,
            "pool built"
        );

        Ok(Arc::new(ForwardingClient::new(
            name,
            backends,
            selectors,
            Arc::clone(&self.deps),
        )))
    }

    #[must_use]
    pub fn probe(&self) -> PoolStatus {
        let client = self.client.get();
        PoolStatus {
            name: self.name.clone(),
            built: client.is_some(),
            targets: client.map_or_else(Vec::new, |c| {
                c.backends()
                    .targets()
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            }),
            algorithm: client.map(|c| c.selectors().algorithm()),
        }
    }

    /// Reconcile a built pool with the store. Returns whether anything
    /// changed. An unbuilt pool is left for its first request to build.
    pub async fn refresh(&self) -> Result<bool, PoolRouteError> {
        let (Some(name), Some(client)) = (self.name.as_deref(), self.client.get()) else {
            return Ok(false);
        };

        let spec = read_pool(&*self.deps.store, &self.deps.defaults, name).await?;
        report_rejected(&spec);

        let backends = client.backends();
        let mut changed = false;

        for target in backends.targets() {
            if !spec.targets.contains(&target) && backends.remove(&target) {
                tracing::info!(pool = %name, target = %target, "removed target");
                changed = true;
            }
        }
        for target in spec.targets.iter().cloned() {
            let shown = target.to_string();
            if backends.add(target) {
                tracing::info!(pool = %name, target = %shown, "added target");
                changed = true;
            }
        }

        let algorithm = spec.algorithm_or(self.deps.defaults.default_algorithm);
        if client.selectors().install(algorithm) {
            tracing::info!(pool = %name, algorithm = %algorithm, "switched algorithm");
            changed = true;
        }

        Ok(changed)
    }
}

fn report_rejected(spec: &PoolSpec) {
    for rejected in &spec.rejected {
        tracing::warn!(
            pool = %spec.name,
            key = %rejected.key,
            value = %rejected.value,
            reason = %rejected.reason,
            "skipping malformed target"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sources::memory::MemoryStore;

    fn deps(store: MemoryStore) -> Arc<PoolDeps> {
        Arc::new(PoolDeps::new(Arc::new(store), ProxyDefaults::default()))
    }

    fn request() -> Request<Body> {
        Request::builder()
            .uri("/orders")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn unnamed_router_answers_500() {
        let router = PoolRouter::new(None, deps(MemoryStore::new()));
        let response = router.handle(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!router.is_built());
    }

    #[tokio::test]
    async fn empty_pool_builds_and_answers_502() {
        let router = PoolRouter::new(Some("ghost".into()), deps(MemoryStore::new()));
        let response = router.handle(request()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(router.is_built());
        assert!(router.probe().targets.is_empty());
    }

    #[tokio::test]
    async fn unknown_algorithm_leaves_pool_unbuilt() {
        let store = MemoryStore::from_pairs([
            ("pools/p/targets/0", "http://a:80"),
            ("pools/p/loadbalance", "fastest"),
        ]);
        let router = PoolRouter::new(Some("p".into()), deps(store));
        let response = router.handle(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!router.is_built());
    }

    #[tokio::test]
    async fn probe_reports_unbuilt_then_built() {
        let store = MemoryStore::from_pairs([
            ("pools/p/targets/0", "http://10.0.0.1:8080"),
            ("pools/p/targets/1", "not a url"),
            ("pools/p/loadbalance", "least_conn"),
        ]);
        let router = PoolRouter::new(Some("p".into()), deps(store));
        assert_eq!(
            router.probe(),
            PoolStatus {
                name: Some("p".into()),
                built: false,
                targets: vec![],
                algorithm: None,
            }
        );

        router.build_for_test().await;
        let status = router.probe();
        assert!(status.built);
        assert_eq!(status.targets, vec!["http://10.0.0.1:8080".to_string()]);
        assert_eq!(status.algorithm, Some(Algorithm::LeastConn));
    }

    #[tokio::test]
    async fn refresh_reconciles_targets_and_algorithm() {
        let store = Arc::new(MemoryStore::from_pairs([
            ("pools/p/targets/0", "http://a:80"),
            ("pools/p/targets/1", "http://b:80"),
        ]));
        let deps = Arc::new(PoolDeps::new(store.clone(), ProxyDefaults::default()));
        let router = PoolRouter::new(Some("p".into()), deps);

        // Unbuilt pools are not touched.
        assert!(!router.refresh().await.unwrap());
        assert!(!router.is_built());

        router.build_for_test().await;
        store.remove("pools/p/targets/0");
        store.insert("pools/p/targets/2", "http://c:80");
        store.insert("pools/p/loadbalance", "random");

        assert!(router.refresh().await.unwrap());
        let status = router.probe();
        assert_eq!(status.targets, vec!["http://b:80", "http://c:80"]);
        assert_eq!(status.algorithm, Some(Algorithm::Random));

        assert!(!router.refresh().await.unwrap());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_current_state() {
        let store = Arc::new(MemoryStore::from_pairs([("pools/p/targets/0", "http://a:80")]));
        let deps = Arc::new(PoolDeps::new(store.clone(), ProxyDefaults::default()));
        let router = PoolRouter::new(Some("p".into()), deps);
        router.build_for_test().await;

        store.insert("pools/p/loadbalance", "bogus");
        assert!(router.refresh().await.is_err());
        let status = router.probe();
        assert_eq!(status.targets, vec!["http://a:80"]);
        assert_eq!(status.algorithm, Some(Algorithm::RoundRobin));
    }

    impl PoolRouter {
        async fn build_for_test(&self) {
            let name = self.name.clone().unwrap();
            self.client
                .get_or_try_init(|| self.build(&name))
                .await
                .unwrap();
        }
    }
}
