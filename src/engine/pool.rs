//! Bounded fan-out over a work list

use super::CancelToken;
use rayon::prelude::*;
use std::sync::Arc;

/// Fixed-size worker pool shared by every stage of a run
///
/// The rayon pool is built once and shared by clones. A pool of one worker
/// has no threads and runs everything inline on the calling thread.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::inline()
    }
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        if workers <= 1 {
            return Self::inline();
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("kscout-worker-{}", i))
            .build()
        {
            Ok(pool) => Self {
                workers,
                pool: Some(Arc::new(pool)),
            },
            Err(e) => {
                tracing::warn!("Failed to build worker pool ({}), running inline", e);
                Self::inline()
            }
        }
    }

    pub fn inline() -> Self {
        Self {
            workers: 1,
            pool: None,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over `items`
    ///
    /// Items not yet started when `cancel` fires are skipped. Returns the
    /// results of the items that ran, in input order, and whether any item
    /// was skipped.
    pub fn run<T, R, F>(&self, items: &[T], cancel: &CancelToken, work: F) -> (Vec<R>, bool)
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        let guarded = |item: &T| {
            if cancel.is_cancelled() {
                None
            } else {
                Some(work(item))
            }
        };

        let slots: Vec<Option<R>> = match &self.pool {
            Some(pool) => pool.install(|| items.par_iter().map(guarded).collect()),
            None => items.iter().map(guarded).collect(),
        };

        let skipped = slots.iter().any(Option::is_none);
        (slots.into_iter().flatten().collect(), skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_inline_preserves_order() {
        let (out, partial) = WorkerPool::new(1).run(&[1, 2, 3], &CancelToken::new(), |n| n * 10);
        assert_eq!(out, vec![10, 20, 30]);
        assert!(!partial);
    }

    #[test]
    fn test_parallel_preserves_order() {
        let items: Vec<usize> = (0..200).collect();
        let (out, partial) = WorkerPool::new(4).run(&items, &CancelToken::new(), |n| n + 1);
        assert_eq!(out.len(), 200);
        assert_eq!(out[0], 1);
        assert_eq!(out[199], 200);
        assert!(!partial);
    }

    #[test]
    fn test_clones_share_one_pool() {
        let pool = WorkerPool::new(3);
        let clone = pool.clone();
        assert_eq!(clone.workers(), 3);
        match (&pool.pool, &clone.pool) {
            (Some(a), Some(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected a threaded pool"),
        }
        assert!(WorkerPool::new(0).pool.is_none());
    }

    #[test]
    fn test_cancel_mid_run_keeps_completed() {
        let cancel = CancelToken::new();
        let done = AtomicUsize::new(0);
        let (out, partial) = WorkerPool::inline().run(&["a", "b", "c"], &cancel, |s| {
            if done.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                cancel.cancel();
            }
            s.to_string()
        });
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
        assert!(partial);
    }
}
