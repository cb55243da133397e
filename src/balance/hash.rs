//! Sticky strategies keyed on a request attribute.
//!
//! The same key maps to the same backend for as long as the set is
//! unchanged. `DefaultHasher::new()` uses fixed keys, so the mapping is
//! also stable across processes built with the same toolchain.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;

use crate::pool::backend_set::Backend;

fn slot<K: Hash + ?Sized>(key: &K, len: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    // Truncation is fine, only the remainder matters.
    #[allow(clippy::cast_possible_truncation)]
    let h = hasher.finish() as usize;
    h % len
}

/// Unknown client addresses all land on the first backend.
pub(crate) fn pick_by_ip(backends: &[Arc<Backend>], ip: Option<IpAddr>) -> &Arc<Backend> {
    match ip {
        Some(ip) => &backends[slot(&ip, backends.len())],
        None => &backends[0],
    }
}

pub(crate) fn pick_by_path<'a>(backends: &'a [Arc<Backend>], path: &str) -> &'a Arc<Backend> {
    &backends[slot(path, backends.len())]
}
