//! Host selection strategies.
//!
//! # Data Flow
//! ```text
//! pool build reads `<pool>/loadbalance`
//!     → Algorithm::from_str (unknown names rejected)
//!     → registry.rs (install per-pool HostSelector)
//! request → HostSelector::select(BackendSet snapshot)
//!     - round_robin.rs (rotate in insertion order)
//!     - random (uniform)
//!     - least_conn.rs (fewest in-flight requests)
//!     - hash.rs (client IP or request path)
//!     → Arc<Backend> or NoTargetAvailable
//! ```
//!
//! The set of strategies is closed: an [`Algorithm`] is resolved once when
//! the pool is built and turned into a [`HostSelector`] value.

pub mod hash;
pub mod least_conn;
pub mod registry;
pub mod round_robin;

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PoolRouteError;
use crate::pool::backend_set::Backend;

pub use registry::HostSelectorRegistry;
pub use round_robin::RoundRobin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    RoundRobin,
    Random,
    LeastConn,
    IpHash,
    UriHash,
}

const EXPECTED: &str = "round_robin, random, least_conn, ip_hash, uri_hash";

impl Algorithm {
    pub const ALL: [Self; 5] = [
        Self::RoundRobin,
        Self::Random,
        Self::LeastConn,
        Self::IpHash,
        Self::UriHash,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
            Self::LeastConn => "least_conn",
            Self::IpHash => "ip_hash",
            Self::UriHash => "uri_hash",
        }
    }

    /// Fresh selector instance for this algorithm.
    #[must_use]
    pub fn selector(self) -> HostSelector {
        match self {
            Self::RoundRobin => HostSelector::RoundRobin(RoundRobin::new()),
            Self::Random => HostSelector::Random,
            Self::LeastConn => HostSelector::LeastConn,
            Self::IpHash => HostSelector::IpHash,
            Self::UriHash => HostSelector::UriHash,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = PoolRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "roundrobin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            "leastconn" | "leastconnections" => Ok(Self::LeastConn),
            "iphash" => Ok(Self::IpHash),
            "urihash" | "hashuripath" => Ok(Self::UriHash),
            _ => Err(PoolRouteError::UnknownAlgorithm {
                name: s.to_string(),
                expected: EXPECTED,
            }),
        }
    }
}

/// Returned when a pool has no backend to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no target available")]
pub struct NoTargetAvailable;

/// Request attributes some strategies key on.
#[derive(Debug, Clone, Default)]
pub struct SelectContext {
    pub client_ip: Option<IpAddr>,
    pub path: String,
}

/// A pool's host selection strategy.
#[derive(Debug)]
pub enum HostSelector {
    RoundRobin(RoundRobin),
    Random,
    LeastConn,
    IpHash,
    UriHash,
}

impl HostSelector {
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        match self {
            Self::RoundRobin(_) => Algorithm::RoundRobin,
            Self::Random => Algorithm::Random,
            Self::LeastConn => Algorithm::LeastConn,
            Self::IpHash => Algorithm::IpHash,
            Self::UriHash => Algorithm::UriHash,
        }
    }

    pub fn select(
        &self,
        backends: &[Arc<Backend>],
        ctx: &SelectContext,
    ) -> Result<Arc<Backend>, NoTargetAvailable> {
        if backends.is_empty() {
            return Err(NoTargetAvailable);
        }
        let picked = match self {
            Self::RoundRobin(rr) => rr.pick(backends),
            Self::Random => &backends[fastrand::usize(..backends.len())],
            Self::LeastConn => least_conn::pick(backends),
            Self::IpHash => hash::pick_by_ip(backends, ctx.client_ip),
            Self::UriHash => hash::pick_by_path(backends, &ctx.path),
        };
        Ok(Arc::clone(picked))
    }
}
