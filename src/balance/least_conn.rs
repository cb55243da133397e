//! Least connections load balancing strategy.

use std::sync::Arc;

use crate::pool::backend_set::Backend;

/// Backend with the fewest in-flight requests. Ties go to the earliest
/// inserted backend. Caller guarantees `backends` is non-empty.
pub(crate) fn pick(backends: &[Arc<Backend>]) -> &Arc<Backend> {
    let mut best = &backends[0];
    for backend in &backends[1..] {
        if backend.in_flight() < best.in_flight() {
            best = backend;
        }
    }
    best
}
