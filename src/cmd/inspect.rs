//! `poolroute inspect`: show what a pool build would load.
//!
//! Reads each named pool from the config store exactly as a router's
//! first request would, and reports the usable targets, the rejected
//! entries, and the algorithm, in human-readable text or JSON.

use crate::cli::{InspectArgs, OutputFormat};
use crate::config::validation::{self, PoolCheck};
use crate::error::{PoolRouteError, ValidationError};

use super::store;

pub async fn execute(args: &InspectArgs) -> Result<(), PoolRouteError> {
    let resolver = store::resolve_config_store(&args.store).await?;
    let defaults = store::proxy_defaults(&args.store);

    let mut checks = Vec::with_capacity(args.pools.len());
    for pool in &args.pools {
        checks.push(validation::check_pool(&resolver, &defaults, pool).await?);
    }

    match args.format {
        OutputFormat::Text => {
            for check in &checks {
                if check.is_valid() {
                    println!(
                        "\u{2713} {}",
                        validation::format_validation_report(check, defaults.default_algorithm)
                    );
                } else {
                    eprintln!(
                        "\u{2717} pool {} has {} errors",
                        check.name,
                        check.errors.len()
                    );
                    for error in &check.errors {
                        eprintln!("{error}");
                    }
                }
            }
        }
        OutputFormat::Json => {
            let store_name = resolver.primary_name();
            let pools: Vec<serde_json::Value> =
                checks.iter().map(|c| check_json(c, store_name)).collect();
            println!("{}", serde_json::json!({ "pools": pools }));
        }
    }

    let errors: Vec<ValidationError> = checks.into_iter().flat_map(|c| c.errors).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PoolRouteError::PoolValidation { errors })
    }
}

fn check_json(check: &PoolCheck, store: &str) -> serde_json::Value {
    let errors: Vec<serde_json::Value> = check
        .errors
        .iter()
        .map(|e| {
            serde_json::json!({
                "field": e.field,
                "message": e.message,
                "suggestion": e.suggestion,
            })
        })
        .collect();

    let mut targets: Vec<String> = Vec::new();
    let mut rejected: Vec<serde_json::Value> = Vec::new();
    let mut algorithm = None;
    if let Some(spec) = &check.spec {
        targets = spec.targets.iter().map(ToString::to_string).collect();
        rejected = spec
            .rejected
            .iter()
            .map(|r| serde_json::json!({ "key": r.key, "value": r.value, "reason": r.reason }))
            .collect();
        algorithm = spec.algorithm;
    }

    serde_json::json!({
        "name": check.name,
        "store": store,
        "valid": check.is_valid(),
        "targets": targets,
        "rejected": rejected,
        "algorithm": algorithm,
        "errors": errors,
    })
}
