//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::pool::backend_set::Backend;

/// Round-robin selector.
///
/// Every call takes a distinct cursor value with a single `fetch_add`, so
/// with a stable set of `n` backends any `n` consecutive selections, even
/// concurrent ones, hit each backend exactly once. When the set changes
/// size between calls the rotation restarts from the new modulus.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller guarantees `backends` is non-empty.
    pub(crate) fn pick<'a>(&self, backends: &'a [Arc<Backend>]) -> &'a Arc<Backend> {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
        &backends[slot % backends.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::{Algorithm, SelectContext};
    use crate::pool::target::Target;

    fn backends(urls: &[&str]) -> Vec<Arc<Backend>> {
        urls.iter()
            .map(|u| Arc::new(Backend::new(Target::parse(u).unwrap())))
            .collect()
    }

    #[test]
    fn rotates_in_insertion_order() {
        let set = backends(&["http://a:80", "http://b:80", "http://c:80"]);
        let selector = Algorithm::RoundRobin.selector();
        let ctx = SelectContext::default();

        let picked: Vec<String> = (0..6)
            .map(|_| selector.select(&set, &ctx).unwrap().target.host().to_string())
            .collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn concurrent_callers_share_rotation_fairly() {
        let set = Arc::new(backends(&["http://a:80", "http://b:80", "http://c:80"]));
        let rr = Arc::new(RoundRobin::new());

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let set = Arc::clone(&set);
                let rr = Arc::clone(&rr);
                std::thread::spawn(move || {
                    (0..300)
                        .map(|_| rr.pick(&set).target.host().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts = std::collections::HashMap::new();
        for h in handles {
            for host in h.join().unwrap() {
                *counts.entry(host).or_insert(0usize) += 1;
            }
        }
        assert_eq!(counts["a"], 600);
        assert_eq!(counts["b"], 600);
        assert_eq!(counts["c"], 600);
    }

    #[test]
    fn adapts_when_set_shrinks() {
        let rr = RoundRobin::new();
        let three = backends(&["http://a:80", "http://b:80", "http://c:80"]);
        let one = backends(&["http://z:80"]);
        rr.pick(&three);
        assert_eq!(rr.pick(&one).target.host(), "z");
        assert_eq!(rr.pick(&one).target.host(), "z");
    }
}
