//! Unified error types for poolroute.
//!
//! Defines [`PoolRouteError`] (the main crate error enum) and
//! [`ValidationError`] for pool configuration problems found in the
//! config store. Both use `thiserror` for `Display` and `Error` derives.
//! Error messages include contextual hints to guide the user toward a fix.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub pool: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  pool {}: {}: {}", self.pool, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolRouteError {
    #[error("No config store found.\n\n  {hint}")]
    NoConfigSource { hint: String },

    #[error("Config store file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Pool configuration is invalid:\n{}", format_errors(.errors))]
    PoolValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid virtual host mapping '{0}' (expected host=pool)")]
    InvalidVhost(String),

    #[error("Unknown load balancing algorithm '{name}' (expected one of: {expected})")]
    UnknownAlgorithm { name: String, expected: &'static str },

    #[error("Invalid target '{value}': {reason}")]
    InvalidTarget { value: String, reason: String },

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Upstream response did not finish before the request deadline")]
    UpstreamDeadline,

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),

    #[error("Config store error ({backend}): {source}")]
    Store {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PoolRouteError {
    /// Shorthand for wrapping a backend-specific failure of a config store.
    pub fn store(
        backend: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Store {
            backend,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_includes_suggestion() {
        let err = ValidationError {
            pool: "checkout".into(),
            field: "loadbalance".into(),
            message: "unknown algorithm 'rr'".into(),
            suggestion: Some("did you mean 'round_robin'?".into()),
        };
        assert_eq!(
            err.to_string(),
            "  pool checkout: loadbalance: unknown algorithm 'rr' (did you mean 'round_robin'?)"
        );
    }

    #[test]
    fn pool_validation_lists_every_error() {
        let errors = vec![
            ValidationError {
                pool: "a".into(),
                field: "targets".into(),
                message: "first".into(),
                suggestion: None,
            },
            ValidationError {
                pool: "b".into(),
                field: "targets".into(),
                message: "second".into(),
                suggestion: None,
            },
        ];
        let msg = PoolRouteError::PoolValidation { errors }.to_string();
        assert!(msg.contains("pool a: targets: first"));
        assert!(msg.contains("pool b: targets: second"));
    }
}
