//! Bounded worker pool for independent fetches.
//!
//! Results come back in input order regardless of which worker finishes
//! first: `par_iter().map().collect()` on an indexed iterator preserves
//! positions.

use rayon::prelude::*;

use crate::error::{ImportError, Result};

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(ImportError::invalid("worker count must be at least 1"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("devdata-worker-{i}"))
            .build()
            .map_err(|e| ImportError::invalid(format!("cannot start worker pool: {e}")))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `f` to every item on the pool; output order matches `items`.
    pub fn map_ordered<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(f).collect())
    }
}

/// Split `items` into consecutive chunks of at most `size` (0 is treated as 1).
pub fn batches<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}
