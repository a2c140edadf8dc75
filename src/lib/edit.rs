//! Applying an [`Operation`] to samples, either one sample at a time or on a bounded pool of
//! workers.
//!
//! An [`Operation`] turns one sample into two collections: the primary result and auxiliary
//! output (e.g. discarded reads).  Editing a collection concatenates those per-sample
//! collections in the order of the input samples, whether or not the samples were processed
//! in parallel.

use anyhow::{ensure, Result};
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::{collection::SequenceCollection, sequence_file::SequenceFile};

/// A transformation of one sample.
pub trait Operation: Send + Sync {
    /// Transform `sample`, returning the primary result and any auxiliary output.
    fn perform(&self, sample: &SequenceFile) -> Result<(SequenceCollection, SequenceCollection)>;
}

/// Something an [`Operation`] can be applied to.
pub trait Editable {
    type Output;

    /// Apply `operation` to every sample in order.
    fn edit<O: Operation + ?Sized>(&self, operation: &O) -> Result<(Self::Output, Self::Output)>;
}

/// Something an [`Operation`] can be applied to on a [`WorkerPool`].
pub trait ParallelEditable: Editable {
    /// Apply `operation` using at most `workers` concurrent workers from `pool`.
    ///
    /// The results are identical to those of [`Editable::edit`] for a deterministic operation.
    /// The first failing task aborts the whole call and completed results are discarded.
    fn edit_parallel<P: WorkerPool, O: Operation + ?Sized>(
        &self,
        pool: &P,
        operation: &O,
        workers: usize,
    ) -> Result<(Self::Output, Self::Output)>;
}

/// A bounded pool of workers.
pub trait WorkerPool: Sync {
    /// Apply `task` to every item using at most `workers` concurrent workers.  Results are
    /// returned in the order of `items`, regardless of the order in which tasks complete.
    fn map<T, R, F>(&self, items: &[T], workers: usize, task: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Send + Sync;
}

/// A [`WorkerPool`] backed by a dedicated rayon thread pool.
pub struct RayonWorkerPool {
    pool: ThreadPool,
}

impl RayonWorkerPool {
    /// Create a pool with `threads` worker threads.
    pub fn new(threads: usize) -> Result<Self> {
        ensure!(threads > 0, "A worker pool needs at least one thread");
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("edit-worker-{}", index))
            .build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl WorkerPool for RayonWorkerPool {
    fn map<T, R, F>(&self, items: &[T], workers: usize, task: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Send + Sync,
    {
        ensure!(workers > 0, "At least one worker is required");
        // At most `workers` chunks are processed concurrently.
        let chunk_size = ((items.len() + workers - 1) / workers).max(1);
        // Indexed parallel iterators collect in item order.
        self.pool.install(|| items.par_iter().with_min_len(chunk_size).map(task).collect())
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use anyhow::{bail, Result};
    use rstest::rstest;

    use super::{RayonWorkerPool, WorkerPool};

    #[rstest]
    #[case(1, 1)]
    #[case(4, 2)]
    #[case(4, 4)]
    #[case(4, 16)]
    fn test_map_preserves_order(#[case] threads: usize, #[case] workers: usize) {
        let pool = RayonWorkerPool::new(threads).unwrap();
        let items = (0..16u64).collect::<Vec<_>>();
        let results = pool
            .map(&items, workers, |item| {
                // Later items finish first.
                thread::sleep(Duration::from_millis(16 - item));
                Ok(item * 10)
            })
            .unwrap();
        assert_eq!(results, items.iter().map(|item| item * 10).collect::<Vec<_>>());
    }

    #[test]
    fn test_map_bounds_concurrency() {
        let pool = RayonWorkerPool::new(8).unwrap();
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items = (0..12).collect::<Vec<_>>();
        pool.map(&items, 2, |_| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_map_first_error_aborts() {
        let pool = RayonWorkerPool::new(2).unwrap();
        let items = (0..8).collect::<Vec<_>>();
        let result: Result<Vec<i32>> = pool.map(&items, 2, |item| {
            if *item == 5 {
                bail!("failed on {}", item)
            }
            Ok(*item)
        });
        assert_eq!(result.unwrap_err().to_string(), "failed on 5");
    }

    #[test]
    fn test_zero_workers_or_threads() {
        assert!(RayonWorkerPool::new(0).is_err());
        let pool = RayonWorkerPool::new(1).unwrap();
        assert_eq!(pool.threads(), 1);
        assert!(pool.map(&[1], 0, |item| Ok(*item)).is_err());
    }
}
