//! Concrete [`ConfigStore`](super::ConfigStore) implementations.
//!
//! Provides the in-memory store, file-based stores (YAML, JSON, TOML)
//! gated by feature flags, the Redis store, and the helpers that turn a
//! nested document into the flat key space a store exposes.

pub mod file_source;
pub mod memory;

#[cfg(feature = "yaml")]
pub mod yaml;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "toml")]
pub mod toml_source;

#[cfg(feature = "redis")]
pub mod redis_source;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::PoolRouteError;

/// Parse a store document based on file extension.
pub fn parse_document_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Value, PoolRouteError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| PoolRouteError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| PoolRouteError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| PoolRouteError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => {
            let _ = (content, path_display);
            Err(PoolRouteError::UnsupportedFormat(other.to_string()))
        }
    }
}

/// Flatten a nested document into `/`-joined keys.
///
/// Objects contribute their field names as key segments and arrays their
/// indices. Scalars become the stored values; `null` leaves are dropped.
#[must_use]
pub fn flatten(document: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(document, String::new(), &mut out);
    out
}

fn flatten_into(value: &Value, key: String, out: &mut BTreeMap<String, String>) {
    let child_key = |segment: &str| {
        if key.is_empty() {
            segment.to_string()
        } else {
            format!("{key}/{segment}")
        }
    };

    match value {
        Value::Object(map) => {
            for (name, child) in map {
                flatten_into(child, child_key(name.trim_matches('/')), out);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                flatten_into(child, child_key(&idx.to_string()), out);
            }
        }
        Value::String(s) => {
            if !key.is_empty() {
                out.insert(key, s.clone());
            }
        }
        Value::Bool(_) | Value::Number(_) => {
            if !key.is_empty() {
                out.insert(key, value.to_string());
            }
        }
        Value::Null => {}
    }
}
