//! Pools: named groups of targets behind one load-balancing algorithm.
//!
//! - [`target`] -- normalized upstream origin.
//! - [`backend_set`] -- the live target list of one pool.
//! - [`router`] -- lazily builds a pool from the config store and forwards
//!   its requests.

pub mod backend_set;
pub mod router;
pub mod target;

pub use backend_set::{Backend, BackendLease, BackendSet};
pub use router::{PoolDeps, PoolRouter, PoolStatus};
pub use target::Target;
