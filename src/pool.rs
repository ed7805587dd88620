// This source code is licensed under the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

//! A fixed-width worker pool for CPU-bound protocol work.
//!
//! Round finalization performs clusters of independent big-integer work:
//! safe-prime search during keygen, per-peer proof generation and
//! verification during signing. A [`Pool`] dispatches those clusters onto a
//! shared [`rayon`] thread pool so multiple cores are exploited without
//! each session spawning threads of its own.
//!
//! The pool exposes only stateless task submission; it is created once per
//! process and cheaply cloned into every session that needs it.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{fmt::Debug, sync::Arc};

/// A handle to a shared worker pool.
///
/// Cloning is cheap and clones refer to the same threads.
#[derive(Clone)]
pub struct Pool {
    threads: Option<Arc<ThreadPool>>,
}

impl Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.threads {
            Some(pool) => write!(f, "Pool({} workers)", pool.current_num_threads()),
            None => write!(f, "Pool(serial)"),
        }
    }
}

impl Pool {
    /// Create a pool with the given number of worker threads; `0` selects
    /// one worker per available core.
    pub fn new(workers: usize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cmp-worker-{i}"))
            .build()
            // Thread spawning only fails under resource exhaustion; running
            // the work inline is the correct degraded behavior.
            .ok();
        Self {
            threads: pool.map(Arc::new),
        }
    }

    /// A pool that runs every task inline on the calling thread.
    pub fn serial() -> Self {
        Self { threads: None }
    }

    /// Run `task` inside the pool, blocking until it completes.
    ///
    /// Rayon parallel iterators used inside `task` are executed by the
    /// pool's workers.
    pub(crate) fn install<T: Send>(&self, task: impl FnOnce() -> T + Send) -> T {
        match &self.threads {
            Some(pool) => pool.install(task),
            None => task(),
        }
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn pool_runs_parallel_work() {
        let pool = Pool::new(2);
        let sum: u64 = pool.install(|| (0..1000u64).into_par_iter().sum());
        assert_eq!(sum, 499_500);
    }

    #[test]
    fn serial_pool_runs_inline() {
        let pool = Pool::serial();
        let value = pool.install(|| 7);
        assert_eq!(value, 7);
    }

    #[test]
    fn clones_share_the_pool() {
        let pool = Pool::new(1);
        let clone = pool.clone();
        assert_eq!(format!("{pool:?}"), format!("{clone:?}"));
    }
}
