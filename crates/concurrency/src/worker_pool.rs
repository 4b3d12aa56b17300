//! Bounded-concurrency batch executor for `import`'s embedding fan-out
//! (spec §5, §4.10).
//!
//! "Bulk `import` pulls at most `concurrency` embeddings in flight;
//! exceeding `batchSize` queued writes yields until the buffer drains."
//! A `tokio::sync::Semaphore` sized to `concurrency` gives the first half
//! directly; the second half (bounding how far ahead of the writer the
//! reader is allowed to race) is a bounded `mpsc` channel of size
//! `batchSize` that callers drain between submitting batches.

use std::sync::Arc;
use tokio::sync::Semaphore;
use vg_core::Result;

/// Runs work items with at most `concurrency` futures in flight at once.
///
/// This mirrors the teacher's bounded-batch commit pattern (one commit
/// lock per shard, never more than N shards committing at once) but
/// applied to embedding calls instead of storage commits.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// A pool admitting at most `concurrency` concurrent tasks.
    /// `concurrency` is clamped to at least 1.
    pub fn new(concurrency: usize) -> Self {
        WorkerPool { semaphore: Arc::new(Semaphore::new(concurrency.max(1))) }
    }

    /// Run every item in `items` through `work`, at most `concurrency` at
    /// a time, and collect results in input order. The first `Err` does
    /// not cancel in-flight siblings (per spec §7: "Embedding failures in
    /// `import` are per-record and do not abort the batch") — every item
    /// is attempted and every result (success or failure) is returned.
    pub async fn run_batch<T, F, Fut>(&self, items: Vec<T>, work: F) -> Vec<Result<T::Output>>
    where
        T: IntoWorkItem,
        F: Fn(T) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<T::Output>> + Send,
    {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let permit = self.semaphore.clone().acquire_owned().await;
            let fut = work(item);
            handles.push(async move {
                let _permit = permit;
                fut.await
            });
        }
        futures::future::join_all(handles).await
    }

    /// Number of permits currently available (for tests/diagnostics).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Marker trait so [`WorkerPool::run_batch`] can name an associated
/// output type without a second generic parameter at every call site.
pub trait IntoWorkItem {
    /// What `work` produces for this item on success.
    type Output;
}

impl<T> IntoWorkItem for T {
    type Output = T;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn never_exceeds_concurrency_limit() {
        let pool = WorkerPool::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));
        let items: Vec<usize> = (0..10).collect();
        let in_flight_c = in_flight.clone();
        let max_c = max_observed.clone();
        let _ = pool
            .run_batch(items, move |i| {
                let in_flight = in_flight_c.clone();
                let max_observed = max_c.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, vg_core::Error>(i)
                }
            })
            .await;
        assert!(max_observed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn per_item_failure_does_not_abort_batch() {
        let pool = WorkerPool::new(4);
        let items: Vec<usize> = (0..5).collect();
        let results = pool
            .run_batch(items, |i| async move {
                if i == 2 {
                    Err(vg_core::Error::not_found("record 2"))
                } else {
                    Ok(i)
                }
            })
            .await;
        assert_eq!(results.len(), 5);
        assert!(results[2].is_err());
        assert!(results[0].is_ok());
        assert!(results[4].is_ok());
    }
}
