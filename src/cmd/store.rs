//! Config store resolution shared by `run` and `inspect`.
//!
//! A database store (Redis) is primary when configured, with the store
//! file as its fallback. Without a database the file is the only store.
//! With no `--store-file`, `poolroute.{yaml,yml,json,toml}` is looked up in
//! the working directory.

use std::path::{Path, PathBuf};

use crate::cli::StoreArgs;
use crate::config::model::ProxyDefaults;
use crate::config::sources;
use crate::config::{ConfigResolver, ConfigStore};
use crate::error::PoolRouteError;

const CANDIDATES: [&str; 4] = [
    "poolroute.yaml",
    "poolroute.yml",
    "poolroute.json",
    "poolroute.toml",
];

pub async fn resolve_config_store(args: &StoreArgs) -> Result<ConfigResolver, PoolRouteError> {
    #[allow(unused_mut)]
    let mut primary: Option<Box<dyn ConfigStore>> = None;

    #[cfg(feature = "redis")]
    if let Some(ref url) = args.redis_url {
        let source = sources::redis_source::RedisSource::new(url).await?;
        primary = Some(Box::new(source));
    }

    let file_source = resolve_file_source(args.store_file.as_deref()).await?;

    match (primary, file_source) {
        (Some(db), fallback) => Ok(ConfigResolver::new(db, fallback)),
        (None, Some(file)) => Ok(ConfigResolver::new(file, None)),
        (None, None) => Err(PoolRouteError::NoConfigSource {
            hint: "Provide --store-file <file> or a database backend flag,\n  \
                   or create ./poolroute.yaml with pools/<name>/targets entries."
                .into(),
        }),
    }
}

/// Node settings derived from the store flags.
#[must_use]
pub fn proxy_defaults(args: &StoreArgs) -> ProxyDefaults {
    ProxyDefaults {
        pools_root: args.pools_root.trim_matches('/').to_string(),
        default_algorithm: args.default_algorithm,
        ..ProxyDefaults::default()
    }
}

async fn resolve_file_source(
    explicit: Option<&Path>,
) -> Result<Option<Box<dyn ConfigStore>>, PoolRouteError> {
    if let Some(path) = explicit {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(PoolRouteError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }
        return create_file_source(path).map(Some);
    }

    for name in &CANDIDATES {
        let path = PathBuf::from(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::info!(path = %path.display(), "auto-detected store file");
            return create_file_source(&path).map(Some);
        }
    }

    Ok(None)
}

pub fn create_file_source(path: &Path) -> Result<Box<dyn ConfigStore>, PoolRouteError> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => Ok(Box::new(sources::yaml::new(path.to_path_buf()))),

        #[cfg(feature = "json")]
        "json" => Ok(Box::new(sources::json::new(path.to_path_buf()))),

        #[cfg(feature = "toml")]
        "toml" => Ok(Box::new(sources::toml_source::new(path.to_path_buf()))),

        other => Err(PoolRouteError::UnsupportedFormat(other.to_string())),
    }
}
