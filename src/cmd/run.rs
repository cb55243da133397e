//! `poolroute run`: start the proxy server.
//!
//! Resolves the config store, starts the Axum HTTP server with graceful
//! shutdown, and spawns a background loop that refreshes built pools
//! from the store.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::RunArgs;
use crate::config::ConfigStore;
use crate::error::PoolRouteError;
use crate::logging;
use crate::pool::router::PoolDeps;
use crate::proxy::vhost::VirtualHosts;
use crate::server::{self, AppState};

use super::store;

pub async fn execute(args: RunArgs) -> Result<(), PoolRouteError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let resolver = store::resolve_config_store(&args.store).await?;
    let store_name = resolver.primary_name().to_string();

    let mut defaults = store::proxy_defaults(&args.store);
    defaults.timeout = args.timeout;
    defaults.connections_per_host = args.connections_per_host;
    defaults.proxy_headers = !args.no_proxy_headers;

    let store: Arc<dyn ConfigStore> = Arc::new(resolver);
    let deps = Arc::new(PoolDeps::new(store, defaults));
    let vhosts = VirtualHosts::from_mappings(
        Arc::clone(&deps),
        &args.vhosts,
        args.default_pool.clone(),
    )?;

    if vhosts.is_empty() && vhosts.default_pool().is_none() {
        tracing::warn!("no --vhost or --default-pool given, every request will get 500");
    }

    let state = Arc::new(AppState::new(vhosts, deps));

    // Shutdown signal: dropping shutdown_tx closes the channel and stops the refresh loop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let refresh_handle = (args.refresh_interval > 0).then(|| {
        let refresh_state = Arc::clone(&state);
        let interval = args.refresh_interval;
        tokio::spawn(async move {
            pool_refresh_loop(refresh_state, interval, shutdown_rx).await;
        })
    });

    let router = server::build_router(Arc::clone(&state), args.max_body);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        addr = %addr,
        store = %store_name,
        pools_root = %state.deps.defaults.pools_root,
        default_algorithm = %state.deps.defaults.default_algorithm,
        virtual_hosts = state.vhosts.len(),
        default_pool = state.vhosts.default_pool().unwrap_or("-"),
        "poolroute started"
    );

    // Wrap the shutdown signal to also stop the refresh loop immediately
    let graceful_shutdown = async move {
        server::shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown)
    .await?;

    // Wait for the refresh task to finish (catches panics)
    if let Some(handle) = refresh_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "pool refresh task failed");
        }
    }

    tracing::info!("poolroute stopped");
    Ok(())
}

pub async fn pool_refresh_loop(
    state: Arc<AppState>,
    interval_secs: u64,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {
                tracing::debug!("pool refresh loop shutting down");
                return;
            }
        }

        state.vhosts.refresh_all().await;
    }
}
