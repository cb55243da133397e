//! Pool configuration validation with detailed error reporting.
//!
//! [`check_pool`] reads one pool from the config store and turns every
//! problem a build would hit (malformed targets, an empty target list,
//! an unknown algorithm) into a [`ValidationError`] with a suggestion
//! where one exists. Store failures are not validation errors and are
//! returned as-is.

use crate::balance::Algorithm;
use crate::error::{PoolRouteError, ValidationError};
use crate::pool::target::Target;

use super::model::ProxyDefaults;
use super::pool::{read_pool, PoolSpec};
use super::ConfigStore;

/// Outcome of checking one pool.
#[derive(Debug)]
pub struct PoolCheck {
    pub name: String,
    /// `None` when the pool could not be read far enough to describe it.
    pub spec: Option<PoolSpec>,
    pub errors: Vec<ValidationError>,
}

impl PoolCheck {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a single target URL. Returns `Ok(())` or a human-readable error.
pub fn validate_target_url(url: &str) -> Result<(), String> {
    Target::parse(url).map(|_| ()).map_err(|e| match e {
        PoolRouteError::InvalidTarget { reason, .. } => format!("'{url}' {reason}"),
        other => other.to_string(),
    })
}

/// Validate an algorithm name. Returns the algorithm or a human-readable error.
pub fn validate_algorithm(name: &str) -> Result<Algorithm, String> {
    name.parse::<Algorithm>()
        .map_err(|_| format!("unknown algorithm '{name}'"))
}

fn algorithm_suggestion(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    Algorithm::ALL
        .iter()
        .find(|a| {
            let canonical = a.as_str();
            lowered
                .get(..2)
                .is_some_and(|head| canonical.starts_with(head) || lowered.contains(canonical))
        })
        .map_or_else(
            || {
                let names: Vec<&str> = Algorithm::ALL.iter().map(|a| a.as_str()).collect();
                format!("expected one of: {}", names.join(", "))
            },
            |a| format!("did you mean '{a}'?"),
        )
}

pub fn validate(spec: &PoolSpec) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for rejected in &spec.rejected {
        errors.push(ValidationError {
            pool: spec.name.clone(),
            field: rejected.key.clone(),
            message: format!("'{}' {}", rejected.value, rejected.reason),
            suggestion: if rejected.value.contains("://") {
                None
            } else {
                Some(format!("did you mean 'http://{}'?", rejected.value))
            },
        });
    }

    if spec.targets.is_empty() {
        errors.push(ValidationError {
            pool: spec.name.clone(),
            field: "targets".into(),
            message: "no usable target; every request would get 502".into(),
            suggestion: None,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub async fn check_pool(
    store: &dyn ConfigStore,
    defaults: &ProxyDefaults,
    name: &str,
) -> Result<PoolCheck, PoolRouteError> {
    match read_pool(store, defaults, name).await {
        Ok(spec) => {
            let errors = validate(&spec).err().unwrap_or_default();
            Ok(PoolCheck {
                name: name.to_string(),
                spec: Some(spec),
                errors,
            })
        }
        Err(PoolRouteError::UnknownAlgorithm { name: algorithm, .. }) => Ok(PoolCheck {
            name: name.to_string(),
            spec: None,
            errors: vec![ValidationError {
                pool: name.to_string(),
                field: "loadbalance".into(),
                message: format!("unknown algorithm '{algorithm}'"),
                suggestion: Some(algorithm_suggestion(&algorithm)),
            }],
        }),
        Err(e) => Err(e),
    }
}

#[must_use]
pub fn format_validation_report(check: &PoolCheck, default_algorithm: Algorithm) -> String {
    let Some(spec) = &check.spec else {
        return format!("pool {} could not be read", check.name);
    };

    let algorithm = spec.algorithm.map_or_else(
        || format!("{default_algorithm} (default)"),
        |a| a.to_string(),
    );

    let mut lines = vec![format!(
        "pool {}: {} targets, algorithm {}",
        spec.name,
        spec.targets.len(),
        algorithm
    )];
    for target in &spec.targets {
        lines.push(format!("    {target}"));
    }
    for rejected in &spec.rejected {
        lines.push(format!("    {} (rejected: {})", rejected.value, rejected.reason));
    }
    lines.join("\n")
}
