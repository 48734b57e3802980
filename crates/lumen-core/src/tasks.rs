// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A fork-join worker pool for embarrassingly parallel per-object work.
//!
//! Workers only ever see shared, immutable inputs and produce private results;
//! `map` returns once every one of them finished, which is the join point.

use crate::config::WorkerConfig;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Fork-join pool backed by a `rayon` thread pool built once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    // `None` when the thread pool could not be built; work then runs on the caller.
    pool: Option<Arc<ThreadPool>>,
    threads: usize,
    min_items_per_worker: usize,
}

impl WorkerPool {
    /// Creates a pool. `threads == 0` selects the available hardware parallelism.
    pub fn new(threads: usize, min_items_per_worker: usize) -> Self {
        let pool = match ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("lumen-worker-{index}"))
            .build()
        {
            Ok(pool) => Some(Arc::new(pool)),
            Err(e) => {
                log::warn!("Worker pool unavailable, running on the render thread: {e}");
                None
            }
        };
        let threads = pool
            .as_ref()
            .map_or(1, |pool| pool.current_num_threads());
        Self {
            pool,
            threads,
            min_items_per_worker: min_items_per_worker.max(1),
        }
    }

    /// Creates a pool from the renderer configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.worker_threads, config.min_objects_per_worker)
    }

    /// Number of worker threads used at most.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Applies `f` to every item in parallel and returns the results in input order.
    ///
    /// No worker receives fewer than `min_items_per_worker` items; smaller inputs
    /// run on the caller's thread. A panicking worker propagates its panic to the
    /// caller.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        let min_len = self.min_items_per_worker;
        match &self.pool {
            Some(pool) if items.len() > min_len => {
                pool.install(|| items.par_iter().with_min_len(min_len).map(&f).collect())
            }
            _ => items.iter().map(&f).collect(),
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_preserves_order() {
        let pool = WorkerPool::new(4, 1);
        let items: Vec<u32> = (0..1000).collect();
        let doubled = pool.map(&items, |x| x * 2);
        assert_eq!(doubled, items.iter().map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_small_inputs_stay_on_caller_thread() {
        let pool = WorkerPool::new(8, 64);
        let caller = std::thread::current().id();
        let ids = pool.map(&[1, 2, 3], |_| std::thread::current().id());
        assert!(ids.iter().all(|id| *id == caller));
    }

    #[test]
    fn test_large_inputs_run_on_pool_threads() {
        let pool = WorkerPool::new(4, 8);
        let items: Vec<u32> = (0..256).collect();
        let workers = pool.map(&items, |_| rayon::current_thread_index());
        assert!(workers.iter().all(|index| matches!(index, Some(i) if *i < 4)));
    }

    #[test]
    fn test_pool_is_reused_across_calls() {
        let pool = WorkerPool::new(2, 1);
        let clone = pool.clone();
        let items: Vec<u32> = (0..64).collect();
        let first = pool.map(&items, |_| std::thread::current().name().map(str::to_owned));
        let second = clone.map(&items, |_| std::thread::current().name().map(str::to_owned));
        for name in first.iter().chain(&second) {
            let name = name.as_deref().unwrap_or_default();
            assert!(name == "lumen-worker-0" || name == "lumen-worker-1", "{name}");
        }
    }

    #[test]
    fn test_thread_count() {
        assert_eq!(WorkerPool::new(3, 1).threads(), 3);
        assert!(WorkerPool::new(0, 1).threads() >= 1);
    }
}
