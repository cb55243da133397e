//! Normalized upstream endpoint.

use std::fmt;
use std::str::FromStr;

use http::uri::{Authority, Scheme};
use url::Url;

use crate::error::PoolRouteError;

/// An upstream endpoint reduced to scheme, host and port.
///
/// Ports default from the scheme, so `http://a` and `http://a:80` are the
/// same target. Anything beyond the origin (path, query, credentials) is
/// rejected: a target names a server, not a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    scheme: String,
    host: String,
    port: u16,
}

impl Target {
    pub fn parse(value: &str) -> Result<Self, PoolRouteError> {
        let invalid = |reason: String| PoolRouteError::InvalidTarget {
            value: value.to_string(),
            reason,
        };

        let url = Url::parse(value.trim()).map_err(|e| invalid(e.to_string()))?;

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(invalid(format!(
                "unsupported scheme '{scheme}' (expected http or https)"
            )));
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_ascii_lowercase(),
            _ => return Err(invalid("missing host".into())),
        };

        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("credentials are not allowed in a target".into()));
        }
        if url.path() != "/" && !url.path().is_empty() {
            return Err(invalid(format!("unexpected path '{}'", url.path())));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed".into()));
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port".into()))?;

        Ok(Self {
            scheme: scheme.to_string(),
            host,
            port,
        })
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    /// `host:port`, with IPv6 hosts kept in brackets.
    #[must_use]
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn uri_scheme(&self) -> Scheme {
        if self.is_https() {
            Scheme::HTTPS
        } else {
            Scheme::HTTP
        }
    }

    pub fn authority(&self) -> Result<Authority, PoolRouteError> {
        self.host_port()
            .parse::<Authority>()
            .map_err(|e| PoolRouteError::UriParse {
                source: Box::new(e),
            })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl FromStr for Target {
    type Err = PoolRouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
