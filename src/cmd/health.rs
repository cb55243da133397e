//! `poolroute health`: check the health of a running instance.
//!
//! Sends a `GET /health` request to the specified URL and displays
//! the response as formatted text or raw JSON.

use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::cli::HealthArgs;
use crate::error::PoolRouteError;
use crate::health::HealthResponse;

pub async fn execute(args: HealthArgs) -> Result<(), PoolRouteError> {
    let url = format!("{}/health", args.url.trim_end_matches('/'));
    let uri: hyper::Uri =
        url.parse().map_err(
            |e: hyper::http::uri::InvalidUri| PoolRouteError::UriParse {
                source: Box::new(e),
            },
        )?;

    let connector = hyper_util::client::legacy::connect::HttpConnector::new();
    let client = Client::builder(TokioExecutor::new()).build(connector);

    let req = hyper::Request::builder()
        .uri(uri)
        .body(http_body_util::Full::new(bytes::Bytes::new()))
        .map_err(|e| PoolRouteError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(std::time::Duration::from_secs(10), client.request(req))
        .await
        .map_err(|_| PoolRouteError::HttpRequest {
            source: "health check timed out after 10s".into(),
        })?
        .map_err(|e| PoolRouteError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| PoolRouteError::HttpRequest {
            source: Box::new(e),
        })?
        .to_bytes();

    if !status.is_success() {
        return Err(PoolRouteError::HealthCheckFailed(status));
    }

    if args.json {
        println!("{}", String::from_utf8_lossy(&body));
        return Ok(());
    }

    match serde_json::from_slice::<HealthResponse>(&body) {
        Ok(health) => print_report(&args.url, &health),
        Err(e) => {
            eprintln!("Failed to parse health response: {e}");
            println!("{}", String::from_utf8_lossy(&body));
        }
    }

    Ok(())
}

fn print_report(url: &str, health: &HealthResponse) {
    println!("\u{2713} poolroute is healthy ({url})");
    println!("  version:        {} ({})", health.version, health.build);
    println!("  uptime:         {}", format_uptime(health.uptime_seconds));
    println!(
        "  store:          {} (root '{}', default {})",
        health.store.name, health.store.pools_root, health.store.default_algorithm
    );
    println!(
        "  requests:       {} forwarded, {} failed",
        health.stats.requests_forwarded, health.stats.requests_failed
    );
    println!(
        "  pools:          {} known, {} builds, {} refreshes",
        health.pools.len(),
        health.stats.pool_builds,
        health.stats.pool_refreshes
    );
    for pool in &health.pools {
        let name = pool.name.as_deref().unwrap_or("-");
        if pool.built {
            let algorithm = pool.algorithm.map_or_else(|| "-".to_string(), |a| a.to_string());
            println!(
                "    {name}: {} targets, {algorithm}",
                pool.targets.len()
            );
        } else {
            println!("    {name}: not built");
        }
    }
}

fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_uptime() {
        assert_eq!(format_uptime(42), "42s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3725), "1h 2m 5s");
    }
}
