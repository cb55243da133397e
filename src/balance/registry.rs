//! Per-pool holder of the active host selector.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::{Algorithm, HostSelector};

/// Active [`HostSelector`] of one pool, replaceable while requests run.
///
/// Callers take an `Arc` through [`current`](Self::current) for the
/// duration of a selection; a concurrent [`install`](Self::install) only
/// affects later callers.
#[derive(Debug)]
pub struct HostSelectorRegistry {
    active: ArcSwap<HostSelector>,
}

impl HostSelectorRegistry {
    #[must_use]
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            active: ArcSwap::from_pointee(algorithm.selector()),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<HostSelector> {
        self.active.load_full()
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.active.load().algorithm()
    }

    /// Swap in a fresh selector for `algorithm`. Installing the algorithm
    /// that is already active is a no-op, which keeps a round-robin cursor
    /// running across config refreshes. Returns whether a swap happened.
    pub fn install(&self, algorithm: Algorithm) -> bool {
        if self.algorithm() == algorithm {
            return false;
        }
        self.active.store(Arc::new(algorithm.selector()));
        true
    }
}

impl Default for HostSelectorRegistry {
    fn default() -> Self {
        Self::new(Algorithm::default())
    }
}
