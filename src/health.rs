//! `GET /health` endpoint handler.
//!
//! Returns a [`HealthResponse`] JSON payload containing the server
//! version and git revision, uptime, config store metadata, the status
//! of every pool router created so far, and cumulative request
//! statistics.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::balance::Algorithm;
use crate::pool::router::PoolStatus;
use crate::server::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build: String,
    pub uptime_seconds: u64,
    pub store: StoreHealth,
    pub pools: Vec<PoolStatus>,
    pub stats: StatsResponse,
}

#[derive(Serialize, Deserialize)]
pub struct StoreHealth {
    pub name: String,
    pub pools_root: String,
    pub default_algorithm: Algorithm,
    pub default_pool: Option<String>,
    pub virtual_hosts: usize,
}

#[derive(Serialize, Deserialize)]
pub struct StatsResponse {
    pub requests_forwarded: u64,
    pub requests_failed: u64,
    pub pool_builds: u64,
    pub pool_refreshes: u64,
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let deps = &state.deps;
    let pools = state.vhosts.probes().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: env!("POOLROUTE_GIT_SHORT").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store: StoreHealth {
            name: deps.store.name().to_string(),
            pools_root: deps.defaults.pools_root.clone(),
            default_algorithm: deps.defaults.default_algorithm,
            default_pool: state.vhosts.default_pool().map(String::from),
            virtual_hosts: state.vhosts.len(),
        },
        pools,
        stats: StatsResponse {
            requests_forwarded: deps.stats.forwarded.load(Ordering::Relaxed),
            requests_failed: deps.stats.failed.load(Ordering::Relaxed),
            pool_builds: deps.stats.builds.load(Ordering::Relaxed),
            pool_refreshes: deps.stats.refreshes.load(Ordering::Relaxed),
        },
    })
}
