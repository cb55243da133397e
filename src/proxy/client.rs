//! Forwarding of one pool's requests to its backends.
//!
//! [`ForwardingClient`] picks a backend with the pool's active host
//! selector, rewrites the request onto that backend, and relays the
//! upstream response. Plain requests go through the shared pooled
//! client; upgrade requests get a dedicated connection (see
//! [`upgrade`](super::upgrade)). Every failure becomes a synthesized
//! `502 Bad Gateway`; there is no retry against another backend.
//!
//! One deadline covers the whole exchange: waiting for a connection
//! slot, the response head, and the relayed body. Upgraded tunnels are
//! only bounded up to the `101` handshake.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, Response, StatusCode, Uri};

use crate::balance::{HostSelectorRegistry, NoTargetAvailable, SelectContext};
use crate::error::PoolRouteError;
use crate::pool::backend_set::{Backend, BackendSet};
use crate::pool::target::Target;
use crate::pool::router::PoolDeps;

use super::headers;
use super::relay::RelayBody;
use super::{synthesized, upgrade};

pub struct ForwardingClient {
    pool: String,
    backends: Arc<BackendSet>,
    selectors: Arc<HostSelectorRegistry>,
    deps: Arc<PoolDeps>,
}

impl ForwardingClient {
    #[must_use]
    pub fn new(
        pool: impl Into<String>,
        backends: Arc<BackendSet>,
        selectors: Arc<HostSelectorRegistry>,
        deps: Arc<PoolDeps>,
    ) -> Self {
        Self {
            pool: pool.into(),
            backends,
            selectors,
            deps,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &str {
        &self.pool
    }

    #[must_use]
    pub fn backends(&self) -> &Arc<BackendSet> {
        &self.backends
    }

    #[must_use]
    pub fn selectors(&self) -> &Arc<HostSelectorRegistry> {
        &self.selectors
    }

    /// Choose a backend for a request with the given attributes.
    pub fn pick(&self, ctx: &SelectContext) -> Result<Arc<Backend>, NoTargetAvailable> {
        let snapshot = self.backends.snapshot();
        self.selectors.current().select(&snapshot, ctx)
    }

    pub async fn forward(&self, mut request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let correlation_id = headers::correlation_id(request.headers());

        let client_ip = client_ip(&request);
        let ctx = SelectContext {
            client_ip,
            path: request.uri().path().to_string(),
        };

        let backend = match self.pick(&ctx) {
            Ok(backend) => backend,
            Err(NoTargetAvailable) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    pool = %self.pool,
                    "no target available"
                );
                self.deps.stats.failed.fetch_add(1, Ordering::Relaxed);
                return synthesized(StatusCode::BAD_GATEWAY, &correlation_id);
            }
        };
        let timeout = Duration::from_millis(self.deps.defaults.timeout);
        let deadline = tokio::time::Instant::now() + timeout;

        // Waiting for a connection slot counts against the request deadline.
        let lease = match tokio::time::timeout_at(deadline, backend.lease()).await {
            Ok(Ok(lease)) => lease,
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    pool = %self.pool,
                    target = %backend.target,
                    connection_limit = self.backends.connection_limit(),
                    "no connection slot before the deadline"
                );
                self.deps.stats.failed.fetch_add(1, Ordering::Relaxed);
                return synthesized(StatusCode::BAD_GATEWAY, &correlation_id);
            }
        };
        let target = lease.target.clone();

        let is_upgrade = headers::is_upgrade_request(request.headers());
        let client_side = is_upgrade.then(|| hyper::upgrade::on(&mut request));

        let (mut parts, body) = request.into_parts();
        parts.headers = headers::build_forwarded_headers(
            &parts.headers,
            client_ip,
            &target,
            &self.deps.defaults,
            &correlation_id,
        );
        parts.uri = match upstream_uri(&parts.uri, &target) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    pool = %self.pool,
                    target = %target,
                    error = %e,
                    "failed to build upstream uri"
                );
                self.deps.stats.failed.fetch_add(1, Ordering::Relaxed);
                return synthesized(StatusCode::BAD_GATEWAY, &correlation_id);
            }
        };
        let outbound = Request::from_parts(parts, body);

        // The lease moves into the relayed body (or the tunnel), so the
        // backend stays occupied until the exchange is really over.
        let result = if let Some(client_side) = client_side {
            tokio::time::timeout_at(
                deadline,
                upgrade::open_tunnel(
                    self.deps.connector.clone(),
                    outbound,
                    client_side,
                    lease,
                    deadline,
                    correlation_id.clone(),
                ),
            )
            .await
        } else {
            tokio::time::timeout_at(deadline, self.deps.http_client.request(outbound))
                .await
                .map(|result| {
                    result
                        .map(|response| RelayBody::wrap(response, lease, deadline))
                        .map_err(|e| PoolRouteError::HttpRequest {
                            source: Box::new(e),
                        })
                })
        };

        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) => {
                tracing::info!(
                    correlation_id = %correlation_id,
                    pool = %self.pool,
                    target = %target,
                    status = response.status().as_u16(),
                    latency_ms,
                    upgrade = is_upgrade,
                    "upstream responded"
                );
                self.deps.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                response
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    pool = %self.pool,
                    target = %target,
                    error = %e,
                    latency_ms,
                    "upstream request failed"
                );
                self.deps.stats.failed.fetch_add(1, Ordering::Relaxed);
                synthesized(StatusCode::BAD_GATEWAY, &correlation_id)
            }
            Err(_) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    pool = %self.pool,
                    target = %target,
                    timeout_ms = self.deps.defaults.timeout,
                    "upstream request timed out"
                );
                self.deps.stats.failed.fetch_add(1, Ordering::Relaxed);
                synthesized(StatusCode::BAD_GATEWAY, &correlation_id)
            }
        }
    }
}

fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Move `original`'s path and query onto the target's origin.
fn upstream_uri(original: &Uri, target: &Target) -> Result<Uri, PoolRouteError> {
    let path_and_query = original
        .path_and_query()
        .map_or("/", axum::http::uri::PathAndQuery::as_str);
    Uri::builder()
        .scheme(target.uri_scheme())
        .authority(target.authority()?)
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| PoolRouteError::UriParse {
            source: Box::new(e),
        })
}
