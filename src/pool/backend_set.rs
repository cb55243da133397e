//! Live, concurrently mutable target list of one pool.
//!
//! Writers publish a complete new list through [`ArcSwap::rcu`]; readers
//! load the current list without locking. A snapshot is an immutable
//! `Arc<Vec<_>>`, so a selection never sees a half-applied add or remove.
//!
//! Each [`Backend`] bounds its concurrent requests with a semaphore sized
//! from the pool's connection limit. A [`BackendLease`] holds one permit
//! plus one in-flight count for as long as the exchange lasts.

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use super::target::Target;

/// A target together with its live request count and connection limit.
#[derive(Debug)]
pub struct Backend {
    pub target: Target,
    in_flight: AtomicUsize,
    permits: Arc<Semaphore>,
}

impl Backend {
    #[must_use]
    pub fn new(target: Target) -> Self {
        Self::with_connection_limit(target, Semaphore::MAX_PERMITS)
    }

    /// A zero limit is raised to one.
    #[must_use]
    pub fn with_connection_limit(target: Target, limit: usize) -> Self {
        Self {
            target,
            in_flight: AtomicUsize::new(0),
            permits: Arc::new(Semaphore::new(limit.clamp(1, Semaphore::MAX_PERMITS))),
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Permits not currently held by a lease.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a free connection slot. The request counts as in flight
    /// while it waits, so `least_conn` sees queued work too.
    pub async fn lease(self: &Arc<Self>) -> Result<BackendLease, AcquireError> {
        let guard = self.track();
        let permit = Arc::clone(&self.permits).acquire_owned().await?;
        Ok(BackendLease {
            guard,
            _permit: permit,
        })
    }

    /// Count a request against this backend until the guard is dropped.
    #[must_use]
    pub fn track(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            backend: Arc::clone(self),
        }
    }
}

/// Decrements the backend's in-flight count on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    backend: Arc<Backend>,
}

impl Deref for InFlightGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.backend.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// One request's hold on a backend: a connection slot and an in-flight count.
#[derive(Debug)]
pub struct BackendLease {
    guard: InFlightGuard,
    _permit: OwnedSemaphorePermit,
}

impl Deref for BackendLease {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

pub type Snapshot = Arc<Vec<Arc<Backend>>>;

#[derive(Debug)]
pub struct BackendSet {
    backends: ArcSwap<Vec<Arc<Backend>>>,
    connection_limit: usize,
}

impl Default for BackendSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendSet {
    #[must_use]
    pub fn new() -> Self {
        Self::with_connection_limit(Semaphore::MAX_PERMITS)
    }

    /// Every backend added to this set allows at most `limit` concurrent requests.
    #[must_use]
    pub fn with_connection_limit(limit: usize) -> Self {
        Self {
            backends: ArcSwap::from_pointee(Vec::new()),
            connection_limit: limit,
        }
    }

    #[must_use]
    pub fn connection_limit(&self) -> usize {
        self.connection_limit
    }

    /// Append `target` unless it is already present. Returns whether it was added.
    pub fn add(&self, target: Target) -> bool {
        let previous = self.backends.rcu(|current| {
            if current.iter().any(|b| b.target == target) {
                Arc::clone(current)
            } else {
                let mut next = Vec::with_capacity(current.len() + 1);
                next.extend(current.iter().cloned());
                next.push(Arc::new(Backend::with_connection_limit(
                    target.clone(),
                    self.connection_limit,
                )));
                Arc::new(next)
            }
        });
        !previous.iter().any(|b| b.target == target)
    }

    /// Remove `target`. Returns whether it was present.
    pub fn remove(&self, target: &Target) -> bool {
        let previous = self.backends.rcu(|current| {
            if current.iter().any(|b| &b.target == target) {
                Arc::new(
                    current
                        .iter()
                        .filter(|b| &b.target != target)
                        .cloned()
                        .collect(),
                )
            } else {
                Arc::clone(current)
            }
        });
        previous.iter().any(|b| &b.target == target)
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.backends.load_full()
    }

    #[must_use]
    pub fn targets(&self) -> Vec<Target> {
        self.backends
            .load()
            .iter()
            .map(|b| b.target.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.load().is_empty()
    }
}
